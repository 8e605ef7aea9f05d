//! The persisted state document: one task definition plus its runtime record
//! per registered task, wrapped in a version tag for forward compatibility.

use crate::cron::CronExpression;
use crate::time::{Instant, Millis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the document shape changes in a way old readers can't
/// tolerate. A store that finds a lower version treats it as absent and
/// starts fresh rather than guessing at a migration.
pub const SCHEMA_VERSION: u32 = 2;

/// The declarative half of a task: what a caller registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub cron: CronExpression,
    pub retry_delay: Millis,
}

/// What a task attempt is doing right now, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// No attempt is outstanding; next fire is computed from `last_cron_fire`.
    Idle,
    /// An attempt was marked in-flight by a plan transaction and has not yet
    /// been resolved by an outcome transaction.
    InFlight,
    /// The previous attempt failed and a retry is due at `retry_at`.
    RetryPending { retry_at: Instant },
}

/// The mutable half of a task: its execution history.
///
/// `status` is the authoritative source of truth the poller acts on;
/// `last_success_time` / `last_failure_time` / `last_attempt_time` are the
/// document's durable audit trail of that same history, kept alongside it so
/// a reader of the persisted document (not just the live poller) can see
/// when a task last ran and how it resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntime {
    /// The most recent cron-scheduled instant this task was considered due
    /// for, whether or not the attempt has resolved yet. `None` before the
    /// task's first poll.
    pub last_cron_fire: Option<Instant>,
    pub status: AttemptStatus,
    /// Set when `status` transitions to `InFlight`, used to recognize and
    /// recover an attempt orphaned by a crash between polls.
    pub in_flight_since: Option<Instant>,
    pub consecutive_failures: u32,
    /// When the most recent attempt (success, failure, or the orphaned
    /// attempt a crash recovery promotes) was dispatched.
    pub last_attempt_time: Option<Instant>,
    /// When the task's callback most recently resolved `Ok`.
    pub last_success_time: Option<Instant>,
    /// When the task's callback most recently resolved `Err`, including an
    /// attempt a crash recovery treats as failed because it never resolved.
    pub last_failure_time: Option<Instant>,
}

impl TaskRuntime {
    pub fn fresh() -> Self {
        Self {
            last_cron_fire: None,
            status: AttemptStatus::Idle,
            in_flight_since: None,
            consecutive_failures: 0,
            last_attempt_time: None,
            last_success_time: None,
            last_failure_time: None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, AttemptStatus::InFlight)
    }

    pub fn is_retry_pending(&self) -> bool {
        matches!(self.status, AttemptStatus::RetryPending { .. })
    }

    pub fn retry_at(&self) -> Option<Instant> {
        match self.status {
            AttemptStatus::RetryPending { retry_at } => Some(retry_at),
            _ => None,
        }
    }

    /// Checks the two cross-field invariants the persisted document must
    /// hold between attempts: an attempt is never recorded older than the
    /// success or failure it produced, and a pending retry exists exactly
    /// when the most recent outcome was a failure. While an attempt is
    /// in-flight the pending-retry flag it consumed on dispatch hasn't been
    /// replaced by an outcome yet, so that half of the check is skipped
    /// until the attempt resolves.
    pub fn invariants_hold(&self) -> bool {
        let newest_outcome = match (self.last_success_time, self.last_failure_time) {
            (Some(s), Some(f)) => Some(s.max(f)),
            (Some(s), None) => Some(s),
            (None, Some(f)) => Some(f),
            (None, None) => None,
        };
        let attempt_not_older_than_outcome = match (self.last_attempt_time, newest_outcome) {
            (Some(attempt), Some(outcome)) => attempt >= outcome,
            (None, Some(_)) => false,
            _ => true,
        };

        if self.is_running() {
            return attempt_not_older_than_outcome;
        }

        let failed_more_recently_than_succeeded = match (self.last_failure_time, self.last_success_time) {
            (Some(f), Some(s)) => f > s,
            (Some(_), None) => true,
            _ => false,
        };

        attempt_not_older_than_outcome && self.is_retry_pending() == failed_more_recently_than_succeeded
    }
}

/// One task's definition and runtime record, persisted together so a
/// reconciliation pass can compare the two in a single lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub definition: TaskDefinition,
    pub runtime: TaskRuntime,
}

/// The entire persisted document: every registered task, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerState {
    pub version: u32,
    /// When the process that wrote this document last called `initialize`.
    /// `None` only for a document that has never been through one, i.e. the
    /// default empty document.
    pub start_time: Option<Instant>,
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl SchedulerState {
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            start_time: None,
            tasks: BTreeMap::new(),
        }
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::empty()
    }
}
