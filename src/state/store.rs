//! The transactional state store contract and an in-memory implementation
//! used by unit tests and the demo binary's dry-run mode.

use super::model::SchedulerState;
use crate::errors::StateStoreError;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// The read-modify-write surface a transaction body sees. Reading and
/// writing go through the handle rather than the store directly so every
/// implementation — in-memory or SQLite — commits through the same path.
pub struct TransactionHandle {
    existing: Option<SchedulerState>,
    new_state: Option<SchedulerState>,
}

impl TransactionHandle {
    pub(crate) fn new(existing: Option<SchedulerState>) -> Self {
        Self {
            existing,
            new_state: None,
        }
    }

    /// The state as it was read at the start of this transaction, or `None`
    /// if nothing has been committed yet (first run, or a store that was
    /// reset).
    pub fn get_existing_state(&self) -> Option<&SchedulerState> {
        self.existing.as_ref()
    }

    /// A convenience over `get_existing_state` for callers that want an
    /// owned, always-present value to mutate.
    pub fn get_current_state(&self) -> SchedulerState {
        self.existing.clone().unwrap_or_default()
    }

    /// Stages a new document to replace the existing one. A transaction that
    /// never calls this leaves the store untouched on commit.
    pub fn set_state(&mut self, state: SchedulerState) {
        self.new_state = Some(state);
    }

    pub(crate) fn into_staged(self) -> Option<SchedulerState> {
        self.new_state
    }
}

/// A durable or in-memory document store holding exactly one
/// `SchedulerState`, accessed only through atomic read-modify-write
/// transactions.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn transaction<F, T>(&self, f: F) -> Result<T, StateStoreError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<T, StateStoreError> + Send,
        T: Send;
}

/// Single-process, single-document store guarded by a mutex held across the
/// whole transaction body. Used by tests and by the demo binary when no
/// durable store path is configured.
pub struct InMemoryStateStore {
    slot: Mutex<Option<SchedulerState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    pub fn seeded(state: SchedulerState) -> Self {
        Self { slot: Mutex::new(Some(state)) }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn transaction<F, T>(&self, f: F) -> Result<T, StateStoreError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<T, StateStoreError> + Send,
        T: Send,
    {
        let mut guard = self.slot.lock().await;
        let mut handle = TransactionHandle::new(guard.clone());
        let result = f(&mut handle)?;
        if let Some(staged) = handle.into_staged() {
            *guard = Some(staged);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::TaskEntry;

    #[tokio::test]
    async fn first_transaction_sees_no_existing_state() {
        let store = InMemoryStateStore::new();
        store
            .transaction(|h| {
                assert!(h.get_existing_state().is_none());
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn committed_state_is_visible_to_next_transaction() {
        let store = InMemoryStateStore::new();
        store
            .transaction(|h| {
                let mut state = h.get_current_state();
                state.tasks.insert(
                    "t".to_string(),
                    TaskEntry {
                        definition: crate::state::model::TaskDefinition {
                            name: "t".to_string(),
                            cron: crate::cron::CronExpression::parse("* * * * *").unwrap(),
                            retry_delay: crate::time::Millis::ZERO,
                        },
                        runtime: crate::state::model::TaskRuntime::fresh(),
                    },
                );
                h.set_state(state);
                Ok::<_, StateStoreError>(())
            })
            .await
            .unwrap();

        store
            .transaction(|h| {
                let state = h.get_existing_state().expect("committed above");
                assert!(state.tasks.contains_key("t"));
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_transaction_does_not_commit() {
        let store = InMemoryStateStore::new();
        let err = store
            .transaction(|h| {
                let mut state = h.get_current_state();
                state.tasks.clear();
                h.set_state(state);
                Err::<(), _>(StateStoreError::CommitFailed { reason: "boom".to_string() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::CommitFailed { .. }));

        store
            .transaction(|h| {
                assert!(h.get_existing_state().is_none());
                Ok(())
            })
            .await
            .unwrap();
    }
}
