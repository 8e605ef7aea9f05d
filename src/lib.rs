//! Declarative, crash-safe, polling cron scheduler.
//!
//! Tasks are registered declaratively against a cron expression; a poll loop
//! checks a durable, transactional state document on a fixed interval and
//! dispatches exactly the tasks that came due since the last check.

pub mod clock;
pub mod config;
pub mod cron;
pub mod errors;
pub mod registration;
pub mod scheduler;
pub mod state;
pub mod time;

pub use clock::{Clock, ManualSleeper, MockClock, Sleeper, SystemClock, TokioSleeper};
pub use config::SchedulerSettings;
pub use cron::{CronExpression, CronParseError};
pub use errors::{RegistrationError, SchedulerError, StateStoreError};
pub use registration::{validate, ParsedRegistration, RawRegistration, RegistrationWarning, TaskCallback};
pub use scheduler::Scheduler;
pub use state::{InMemoryStateStore, SchedulerState, SqliteStateStore, StateStore};
pub use time::{Instant, Millis};
