//! Non-negative millisecond duration value.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Millis(u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    /// Returns `None` if `millis` is negative.
    pub fn from_signed(millis: i64) -> Option<Self> {
        u64::try_from(millis).ok().map(Millis)
    }

    pub fn from_u64(millis: u64) -> Self {
        Millis(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.0 as i64)
    }

    pub fn as_tokio(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }

    pub fn exceeds_a_day(&self) -> bool {
        self.0 > 24 * 60 * 60 * 1000
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.0 / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        if hours > 0 {
            write!(f, "{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            write!(f, "{}m {}s", minutes, seconds)
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative() {
        assert!(Millis::from_signed(-1).is_none());
        assert_eq!(Millis::from_signed(5).unwrap().as_millis(), 5);
    }

    #[test]
    fn formats_like_elapsed_time() {
        assert_eq!(Millis::from_u64(500).to_string(), "500ms");
        assert_eq!(Millis::from_u64(65_000).to_string(), "1m 5s");
        assert_eq!(Millis::from_u64(3_661_000).to_string(), "1h 1m 1s");
    }

    #[test]
    fn over_a_day() {
        assert!(!Millis::from_u64(23 * 3_600_000).exceeds_a_day());
        assert!(Millis::from_u64(25 * 3_600_000).exceeds_a_day());
    }
}
