//! The two transactions a single poll tick runs: a plan transaction that
//! marks the due set in-flight, then one outcome transaction per dispatched
//! task once its callback resolves.

use crate::errors::{SchedulerError, StateStoreError};
use crate::registration::TaskCallback;
use crate::state::{self, AttemptStatus, DueOutcome, StateStore};
use crate::time::{Instant, Millis};
use std::collections::HashMap;
use tracing::{error, warn};

/// A task chosen to run this tick and the cron instant (or retry deadline)
/// it is running for.
#[derive(Debug, Clone)]
pub struct DueTask {
    pub name: String,
    pub fire: Instant,
}

/// Scans every task, marks the due ones in-flight, and commits the result in
/// one transaction. Two concurrent plan calls can never both pick up the
/// same task since the read-modify-write is atomic.
pub async fn plan<S: StateStore>(
    store: &S,
    now: Instant,
    lookback_days: i64,
) -> Result<Vec<DueTask>, SchedulerError> {
    let due = store
        .transaction(|handle| {
            let mut scheduler_state = handle.get_current_state();
            let mut due = Vec::new();

            for (name, entry) in scheduler_state.tasks.iter_mut() {
                let outcome = state::evaluate(entry, now, lookback_days).map_err(|_| {
                    StateStoreError::CommitFailed {
                        reason: format!("cron calculation bound exceeded while evaluating task '{}'", name),
                    }
                })?;

                match outcome {
                    DueOutcome::NotDue => {}
                    DueOutcome::Due { fire } => {
                        entry.runtime.status = AttemptStatus::InFlight;
                        entry.runtime.in_flight_since = Some(now);
                        entry.runtime.last_attempt_time = Some(now);
                        entry.runtime.last_cron_fire = Some(fire);
                        due.push(DueTask { name: name.clone(), fire });
                    }
                    DueOutcome::RetryDue { fire, newer_cron_fire } => {
                        entry.runtime.status = AttemptStatus::InFlight;
                        entry.runtime.in_flight_since = Some(now);
                        entry.runtime.last_attempt_time = Some(now);
                        if let Some(newer) = newer_cron_fire {
                            entry.runtime.last_cron_fire = Some(newer);
                        }
                        due.push(DueTask { name: name.clone(), fire });
                    }
                }
                debug_assert!(entry.runtime.invariants_hold(), "task '{}' violated its runtime invariants", name);
            }

            handle.set_state(scheduler_state);
            Ok(due)
        })
        .await?;

    Ok(due)
}

/// Commits the result of one task's attempt: success clears its failure
/// streak and returns it to idle; failure schedules a retry after the
/// task's configured delay.
pub async fn record_outcome<S: StateStore>(
    store: &S,
    name: &str,
    now: Instant,
    retry_delay: Millis,
    success: bool,
) -> Result<(), SchedulerError> {
    store
        .transaction(|handle| {
            let mut scheduler_state = handle.get_current_state();
            if let Some(entry) = scheduler_state.tasks.get_mut(name) {
                entry.runtime.in_flight_since = None;
                if success {
                    entry.runtime.status = AttemptStatus::Idle;
                    entry.runtime.consecutive_failures = 0;
                    entry.runtime.last_success_time = Some(now);
                } else {
                    entry.runtime.consecutive_failures += 1;
                    entry.runtime.last_failure_time = Some(now);
                    let retry_at = Instant::from_epoch_millis(
                        now.epoch_millis() + retry_delay.as_millis() as i64,
                    )
                    .unwrap_or(now);
                    entry.runtime.status = AttemptStatus::RetryPending { retry_at };
                }
                debug_assert!(entry.runtime.invariants_hold(), "task '{}' violated its runtime invariants", name);
            }
            handle.set_state(scheduler_state);
            Ok(())
        })
        .await
        .map_err(SchedulerError::from)
}

/// Runs one full poll tick: plan, dispatch every due task's callback
/// concurrently, then record each outcome as soon as it resolves.
pub async fn run_tick<S: StateStore>(
    store: &S,
    callbacks: &HashMap<String, TaskCallback>,
    retry_delays: &HashMap<String, Millis>,
    now: Instant,
    lookback_days: i64,
) -> Result<(), SchedulerError> {
    let due = plan(store, now, lookback_days).await?;
    if due.is_empty() {
        return Ok(());
    }

    let dispatched = due.into_iter().map(|task| {
        let callback = callbacks.get(&task.name).cloned();
        async move {
            let outcome = match callback {
                Some(cb) => cb().await,
                None => Ok(()),
            };
            (task.name, outcome)
        }
    });

    let results = futures::future::join_all(dispatched).await;

    for (name, outcome) in results {
        let retry_delay = retry_delays.get(&name).copied().unwrap_or(Millis::ZERO);
        let success = match &outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(task = %name, error = %e, "task callback failed, scheduling a retry");
                false
            }
        };
        if let Err(e) = record_outcome(store, &name, now, retry_delay, success).await {
            error!(task = %name, error = %e, "failed to record task outcome");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::CronExpression;
    use crate::state::{InMemoryStateStore, TaskDefinition, TaskEntry, TaskRuntime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn seeded(name: &str, cron: &str) -> InMemoryStateStore {
        let store = InMemoryStateStore::new();
        store
            .transaction(|h| {
                let mut s = h.get_current_state();
                s.tasks.insert(
                    name.to_string(),
                    TaskEntry {
                        definition: TaskDefinition {
                            name: name.to_string(),
                            cron: CronExpression::parse(cron).unwrap(),
                            retry_delay: Millis::ZERO,
                        },
                        runtime: TaskRuntime::fresh(),
                    },
                );
                h.set_state(s);
                Ok::<_, StateStoreError>(())
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn first_tick_runs_a_task_already_due_on_registration() {
        let store = seeded("t", "0 * * * *").await;
        let now = Instant::with_fields(2021, 1, 1, 0, 0).unwrap();
        let due = plan(&store, now, 30).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "t");
    }

    #[tokio::test]
    async fn does_not_run_twice_for_the_same_fire() {
        let store = seeded("t", "0 * * * *").await;
        let t0 = Instant::with_fields(2021, 1, 1, 0, 0).unwrap();
        plan(&store, t0, 30).await.unwrap();

        let due = plan(&store, t0.add_minutes(30), 30).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn missed_fires_collapse_into_a_single_run() {
        let store = seeded("t", "0 * * * *").await;
        let t0 = Instant::with_fields(2021, 1, 1, 0, 0).unwrap();
        plan(&store, t0, 30).await.unwrap();

        let t4 = t0.add_minutes(4 * 60);
        let due = plan(&store, t4, 30).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].fire, t4);
    }

    #[tokio::test]
    async fn full_tick_success_returns_task_to_idle() {
        let store = seeded("t", "0 * * * *").await;
        let t0 = Instant::with_fields(2021, 1, 1, 0, 0).unwrap();
        let t_unrelated = t0.add_minutes(30);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut callbacks: HashMap<String, TaskCallback> = HashMap::new();
        callbacks.insert(
            "t".to_string(),
            Arc::new(move || {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );
        let retry_delays = HashMap::new();

        run_tick(&store, &callbacks, &retry_delays, t0, 30).await.unwrap();
        run_tick(&store, &callbacks, &retry_delays, t_unrelated, 30).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store
            .transaction(|h| {
                let state = h.get_existing_state().unwrap();
                assert!(!state.tasks["t"].runtime.is_running());
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failure_schedules_a_retry() {
        let store = InMemoryStateStore::new();
        store
            .transaction(|h| {
                let mut s = h.get_current_state();
                s.tasks.insert(
                    "t".to_string(),
                    TaskEntry {
                        definition: TaskDefinition {
                            name: "t".to_string(),
                            cron: CronExpression::parse("* * * * *").unwrap(),
                            retry_delay: Millis::from_u64(60_000),
                        },
                        runtime: TaskRuntime::fresh(),
                    },
                );
                h.set_state(s);
                Ok::<_, StateStoreError>(())
            })
            .await
            .unwrap();

        let t0 = Instant::with_fields(2024, 1, 1, 0, 0).unwrap();

        let mut callbacks: HashMap<String, TaskCallback> = HashMap::new();
        callbacks.insert(
            "t".to_string(),
            Arc::new(|| Box::pin(async { Err(anyhow::anyhow!("boom")) })),
        );
        let mut retry_delays = HashMap::new();
        retry_delays.insert("t".to_string(), Millis::from_u64(60_000));

        run_tick(&store, &callbacks, &retry_delays, t0, 30).await.unwrap();

        store
            .transaction(|h| {
                let state = h.get_existing_state().unwrap();
                assert!(state.tasks["t"].runtime.is_retry_pending());
                assert_eq!(state.tasks["t"].runtime.consecutive_failures, 1);
                Ok(())
            })
            .await
            .unwrap();
    }

    /// A pending retry's deadline and a fresh cron fire can both have
    /// elapsed by the same poll. The task still runs exactly once, via the
    /// retry path, but `plan` must still advance `last_cron_fire` to the new
    /// instant so the next poll doesn't treat it as an unserviced backlog.
    #[tokio::test]
    async fn plan_advances_last_cron_fire_when_retry_and_cron_are_both_due() {
        let store = InMemoryStateStore::new();
        let t0 = Instant::with_fields(2021, 1, 1, 0, 0).unwrap();
        let t1 = t0.add_minutes(60);
        let retry_at = t1.add_minutes(-5);

        store
            .transaction(|h| {
                let mut s = h.get_current_state();
                let mut runtime = TaskRuntime::fresh();
                runtime.last_cron_fire = Some(t0);
                runtime.status = crate::state::AttemptStatus::RetryPending { retry_at };
                s.tasks.insert(
                    "t".to_string(),
                    TaskEntry {
                        definition: TaskDefinition {
                            name: "t".to_string(),
                            cron: CronExpression::parse("0 * * * *").unwrap(),
                            retry_delay: Millis::from_u64(60_000),
                        },
                        runtime,
                    },
                );
                h.set_state(s);
                Ok::<_, StateStoreError>(())
            })
            .await
            .unwrap();

        let due = plan(&store, t1, 30).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].fire, retry_at);

        store
            .transaction(|h| {
                let state = h.get_existing_state().unwrap();
                assert_eq!(state.tasks["t"].runtime.last_cron_fire, Some(t1));
                Ok(())
            })
            .await
            .unwrap();

        record_outcome(&store, "t", t1, Millis::from_u64(60_000), true).await.unwrap();

        let due_again = plan(&store, t1.add_minutes(1), 30).await.unwrap();
        assert!(due_again.is_empty(), "the serviced cron fire must not be replayed");
    }
}
