//! The scheduler façade: declares tasks, recovers from a crash, and drives
//! the poll loop until asked to stop.

mod poller;

use crate::clock::{Clock, Sleeper};
use crate::errors::SchedulerError;
use crate::registration::{validate, ParsedRegistration, RawRegistration, RegistrationWarning, TaskCallback};
use crate::state::{self, AttemptStatus, StateStore};
use crate::time::{Instant, Millis};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct Dispatch {
    callbacks: HashMap<String, TaskCallback>,
    retry_delays: HashMap<String, Millis>,
}

/// Owns the collaborators needed to run a poll loop: a durable store, a
/// clock, a sleeper, and the registered tasks' callbacks.
///
/// Lifecycle is `new` (build, idle) -> `initialize` (declare the task set,
/// reconcile against persisted state, recover any crashed attempt) ->
/// `start` (spawn the poll loop) -> `stop`. `tick_once` runs a single poll
/// tick without a loop, for tests that drive time themselves.
pub struct Scheduler<S: StateStore + 'static, C: Clock + 'static, K: Sleeper + 'static> {
    store: Arc<S>,
    clock: Arc<C>,
    sleeper: Arc<K>,
    polling_interval: Millis,
    lookback_days: i64,
    dispatch: Mutex<Option<Arc<Dispatch>>>,
    running: AtomicBool,
    stop_flag: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: StateStore, C: Clock, K: Sleeper> Scheduler<S, C, K> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<C>,
        sleeper: Arc<K>,
        polling_interval: Millis,
        lookback_days: i64,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            sleeper,
            polling_interval,
            lookback_days,
            dispatch: Mutex::new(None),
            running: AtomicBool::new(false),
            stop_flag: Arc::new(AtomicBool::new(false)),
            join_handle: Mutex::new(None),
        })
    }

    /// Validates the given registrations, reconciles them against whatever
    /// is already persisted (dropping tasks no longer declared, carrying
    /// runtime state forward for tasks whose schedule is unchanged), and
    /// promotes any attempt a prior process left in-flight to a pending
    /// retry. Returns non-fatal warnings about the input, or the first
    /// validation error.
    ///
    /// Cannot be called while the poll loop is running; `stop` first if you
    /// need to change the registered task set.
    pub async fn initialize(
        self: &Arc<Self>,
        registrations: Vec<RawRegistration>,
    ) -> Result<Vec<RegistrationWarning>, SchedulerError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (parsed, warnings) = validate(registrations)?;
        for warning in &warnings {
            warn!(?warning, "registration warning");
        }

        let now = self.clock.now();
        self.reconcile_and_recover(&parsed, now).await?;

        let mut callbacks = HashMap::with_capacity(parsed.len());
        let mut retry_delays = HashMap::with_capacity(parsed.len());
        for ParsedRegistration { name, callback, retry_delay, .. } in &parsed {
            callbacks.insert(name.clone(), callback.clone());
            retry_delays.insert(name.clone(), *retry_delay);
        }
        *self.dispatch.lock().expect("dispatch mutex poisoned") =
            Some(Arc::new(Dispatch { callbacks, retry_delays }));

        info!(task_count = parsed.len(), "scheduler tasks declared");
        Ok(warnings)
    }

    /// Spawns the poll loop. Returns `AlreadyRunning` if it is already
    /// spawned; call `initialize` at least once first.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        let handle = tokio::spawn(Self::run_loop(
            self.store.clone(),
            self.clock.clone(),
            self.sleeper.clone(),
            self.dispatch_snapshot(),
            self.polling_interval,
            self.lookback_days,
            self.stop_flag.clone(),
        ));
        *self.join_handle.lock().expect("join handle mutex poisoned") = Some(handle);
        info!("scheduler poll loop started");
        Ok(())
    }

    fn dispatch_snapshot(&self) -> Arc<Dispatch> {
        self.dispatch
            .lock()
            .expect("dispatch mutex poisoned")
            .clone()
            .expect("initialize must run before start or tick_once")
    }

    async fn reconcile_and_recover(
        &self,
        parsed: &[ParsedRegistration],
        now: Instant,
    ) -> Result<(), SchedulerError> {
        self.store
            .transaction(|handle| {
                let existing = handle.get_current_state();
                let mut reconciled = state::reconcile(&existing, parsed, now);

                for (name, entry) in reconciled.tasks.iter_mut() {
                    if entry.runtime.is_running() {
                        entry.runtime.consecutive_failures += 1;
                        entry.runtime.in_flight_since = None;
                        entry.runtime.last_attempt_time = Some(now);
                        entry.runtime.last_failure_time = Some(now);
                        entry.runtime.status = AttemptStatus::RetryPending { retry_at: now };
                        debug_assert!(
                            entry.runtime.invariants_hold(),
                            "task '{}' violated its runtime invariants after crash recovery",
                            name
                        );
                    }
                }

                handle.set_state(reconciled);
                Ok(())
            })
            .await
            .map_err(SchedulerError::from)
    }

    async fn run_loop(
        store: Arc<S>,
        clock: Arc<C>,
        sleeper: Arc<K>,
        dispatch: Arc<Dispatch>,
        polling_interval: Millis,
        lookback_days: i64,
        stop_flag: Arc<AtomicBool>,
    ) {
        while !stop_flag.load(Ordering::SeqCst) {
            let now = clock.now();
            if let Err(e) =
                poller::run_tick(&*store, &dispatch.callbacks, &dispatch.retry_delays, now, lookback_days).await
            {
                tracing::error!(error = %e, "poll tick failed");
            }

            if stop_flag.load(Ordering::SeqCst) {
                break;
            }

            let next = Instant::from_epoch_millis(now.epoch_millis() + polling_interval.as_millis() as i64)
                .unwrap_or(now);
            sleeper.sleep_until(next).await;
        }
    }

    /// Runs exactly one plan-dispatch-record cycle against the clock's
    /// current reading, without looping or sleeping. Meant for tests that
    /// drive a `MockClock` themselves; `start` uses this internally in its
    /// own loop.
    pub async fn tick_once(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let dispatch = self.dispatch_snapshot();
        let now = self.clock.now();
        poller::run_tick(&*self.store, &dispatch.callbacks, &dispatch.retry_delays, now, self.lookback_days)
            .await
    }

    /// Signals the poll loop to stop and waits for any in-flight tick to
    /// finish, so no dispatched callback is abandoned mid-run.
    pub async fn stop(self: &Arc<Self>) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let handle = self.join_handle.lock().expect("join handle mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
