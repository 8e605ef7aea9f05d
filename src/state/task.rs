//! Reconciliation of registrations against persisted state, and the
//! due/not-due decision a poll tick makes for a single task.

use super::model::{SchedulerState, TaskDefinition, TaskEntry, TaskRuntime};
use crate::cron::{self, CalculatorBoundExceeded};
use crate::registration::ParsedRegistration;
use crate::time::Instant;
use std::collections::BTreeMap;

/// Rebuilds the task map from the registrations a caller just declared.
///
/// A task whose cron expression and retry delay are unchanged keeps its
/// runtime record (in-flight attempts, retry state, fire history) intact. A
/// task whose cron expression or retry delay changed starts over, since its
/// due/not-due history no longer means anything under the new schedule. A
/// task present in the existing state but absent from `registrations` is
/// dropped. `process_start` stamps the document with the time of this
/// `initialize` call, overwriting whatever a prior process recorded there.
pub fn reconcile(
    existing: &SchedulerState,
    registrations: &[ParsedRegistration],
    process_start: Instant,
) -> SchedulerState {
    let mut tasks = BTreeMap::new();

    for reg in registrations {
        let definition = TaskDefinition {
            name: reg.name.clone(),
            cron: reg.cron.clone(),
            retry_delay: reg.retry_delay,
        };

        let runtime = match existing.tasks.get(&reg.name) {
            Some(prior)
                if prior.definition.cron.source() == reg.cron.source()
                    && prior.definition.retry_delay == reg.retry_delay =>
            {
                prior.runtime.clone()
            }
            _ => TaskRuntime::fresh(),
        };

        tasks.insert(reg.name.clone(), TaskEntry { definition, runtime });
    }

    SchedulerState {
        version: SchedulerState::empty().version,
        start_time: Some(process_start),
        tasks,
    }
}

/// The outcome of checking a single task against the clock during a plan
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueOutcome {
    NotDue,
    /// A cron-scheduled instant more recent than `last_cron_fire` has
    /// elapsed; run the task for it.
    Due { fire: Instant },
    /// A prior failed attempt's retry delay has elapsed. `newer_cron_fire`
    /// is set when a cron-scheduled instant more recent than `last_cron_fire`
    /// has *also* elapsed by `now` — the retry and the fresh cron fire are
    /// serviced by the same single run, so the caller must still advance
    /// `last_cron_fire` to it, or the next poll sees that instant as
    /// never-serviced and runs the task again for it.
    RetryDue {
        fire: Instant,
        newer_cron_fire: Option<Instant>,
    },
}

/// Decides whether `entry` is due for a fresh run or a retry at `now`.
///
/// A task with an in-flight attempt is never due regardless of the clock. A
/// task with a pending retry is due only once its retry deadline has passed;
/// when it is, the cron schedule is checked too, since a retry deadline and a
/// fresh cron fire can both land in the same poll — the task still runs only
/// once, but `last_cron_fire` must move forward so that fire isn't replayed
/// on the next poll. Otherwise a task is due when the most recent
/// cron-scheduled instant is strictly newer than the last one it ran for — a
/// task that has never run at all (`last_cron_fire` is `None`) is due the
/// moment any scheduled instant has elapsed, which is what lets a task
/// registered exactly on its scheduled minute run on the very first tick.
/// Checking only the single most recent instant, never a backlog, is what
/// makes a poll enforce at-most-one execution per task per tick regardless of
/// how many instants were missed.
pub fn evaluate(
    entry: &TaskEntry,
    now: Instant,
    lookback_days: i64,
) -> Result<DueOutcome, CalculatorBoundExceeded> {
    if entry.runtime.is_running() {
        return Ok(DueOutcome::NotDue);
    }

    if let Some(retry_at) = entry.runtime.retry_at() {
        if retry_at > now {
            return Ok(DueOutcome::NotDue);
        }

        let most_recent = cron::most_recent_fire(&entry.definition.cron, now, lookback_days)?;
        let newer_cron_fire = match (most_recent, entry.runtime.last_cron_fire) {
            (Some(fire), Some(last)) if fire > last => Some(fire),
            (Some(fire), None) => Some(fire),
            _ => None,
        };
        return Ok(DueOutcome::RetryDue { fire: retry_at, newer_cron_fire });
    }

    let most_recent = cron::most_recent_fire(&entry.definition.cron, now, lookback_days)?;
    Ok(match (most_recent, entry.runtime.last_cron_fire) {
        (Some(fire), Some(last)) if fire > last => DueOutcome::Due { fire },
        (Some(fire), None) => DueOutcome::Due { fire },
        _ => DueOutcome::NotDue,
    })
}
