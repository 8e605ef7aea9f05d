//! Clock and sleep abstractions, injected into the scheduler the same way
//! the rest of this crate's collaborators are: as constructor parameters,
//! not globals, so tests can swap in deterministic stand-ins.

use crate::time::Instant;
use async_trait::async_trait;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits until `until` has passed according to whatever the sleeper
    /// considers "now" to be. Implementations for production wait on the
    /// wall clock; test implementations return immediately and let the test
    /// drive time itself.
    async fn sleep_until(&self, until: Instant);
}

/// Production `Clock` backed by the system wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Production `Sleeper` backed by `tokio::time::sleep`.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep_until(&self, until: Instant) {
        let now = Instant::now();
        if until <= now {
            return;
        }
        let remaining = (until.epoch_millis() - now.epoch_millis()).max(0) as u64;
        tokio::time::sleep(std::time::Duration::from_millis(remaining)).await;
    }
}

/// Test `Clock` whose value is set explicitly rather than advancing on its
/// own, so a poll loop can be driven tick-by-tick against known instants.
pub struct MockClock {
    now: Mutex<Instant>,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, instant: Instant) {
        *self.now.lock().expect("mock clock mutex poisoned") = instant;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut guard = self.now.lock().expect("mock clock mutex poisoned");
        *guard = guard.add_minutes(minutes);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("mock clock mutex poisoned")
    }
}

/// Test `Sleeper` that never actually waits. Poll loops under test call
/// `tick` directly and advance a `MockClock` between calls instead of
/// relying on real elapsed time, so this just returns immediately.
pub struct ManualSleeper;

#[async_trait]
impl Sleeper for ManualSleeper {
    async fn sleep_until(&self, _until: Instant) {}
}
