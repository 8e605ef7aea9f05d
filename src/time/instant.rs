//! Opaque instant value used throughout the scheduler.
//!
//! Wraps a UTC `chrono` timestamp truncated to millisecond precision so that
//! round-tripping through the persisted state document never drifts.

use chrono::{DateTime, Datelike, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant(DateTime<Utc>);

impl Instant {
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }

    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(3))
    }

    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn day_of_month(&self) -> u32 {
        self.0.day()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Sunday = 0, matching spec.md's weekday numbering (no alias to 7).
    pub fn weekday(&self) -> u32 {
        self.0.weekday().num_days_from_sunday()
    }

    /// Truncates seconds and below, returning the start of this minute.
    pub fn start_of_minute(&self) -> Self {
        Self(
            self.0
                .with_second(0)
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(self.0),
        )
    }

    pub fn start_of_hour(&self) -> Self {
        Self(
            self.0
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(self.0),
        )
    }

    pub fn start_of_day(&self) -> Self {
        Self(
            self.0
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(self.0),
        )
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + chrono::Duration::minutes(minutes))
    }

    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + chrono::Duration::days(days))
    }

    pub fn with_fields(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        use chrono::TimeZone;
        match Utc.with_ymd_and_hms(year, month, day, hour, minute, 0) {
            chrono::LocalResult::Single(dt) => Some(Self(dt)),
            _ => None,
        }
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    pub fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| Self(dt.with_timezone(&Utc)))
    }

    pub fn inner(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Instant {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}
