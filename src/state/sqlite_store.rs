//! Durable `StateStore` backed by a single-row SQLite table.
//!
//! SQLite's own file locking already serializes writers across processes; the
//! `tokio::sync::Mutex` held across the whole transaction body adds
//! in-process ordering on top of that so two callers in the same process
//! never race to read-modify-write the same row.

use super::model::{SchedulerState, SCHEMA_VERSION};
use super::store::{StateStore, TransactionHandle};
use crate::errors::StateStoreError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct SqliteStateStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStateStore {
    pub async fn connect(path: &Path) -> Result<Self, StateStoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StateStoreError::CommitFailed { reason: e.to_string() })?
            .create_if_missing(true);

        info!(db_path = %path.display(), "opening scheduler state store");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scheduler_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                document TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    async fn read(&self) -> Result<Option<SchedulerState>, StateStoreError> {
        let row = sqlx::query("SELECT document FROM scheduler_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let document: String = row
            .try_get("document")
            .map_err(|e| StateStoreError::DecodeFailed { reason: e.to_string() })?;

        match serde_json::from_str::<SchedulerState>(&document) {
            Ok(state) if state.version == SCHEMA_VERSION => Ok(Some(state)),
            Ok(stale) => {
                debug!(found_version = stale.version, current_version = SCHEMA_VERSION,
                    "persisted document is from an old schema version, treating as absent");
                Ok(None)
            }
            Err(e) => Err(StateStoreError::DecodeFailed { reason: e.to_string() }),
        }
    }

    async fn write(&self, state: &SchedulerState) -> Result<(), StateStoreError> {
        let document = serde_json::to_string(state)
            .map_err(|e| StateStoreError::CommitFailed { reason: e.to_string() })?;

        sqlx::query(
            "INSERT INTO scheduler_state (id, version, document) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version, document = excluded.document",
        )
        .bind(state.version as i64)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn transaction<F, T>(&self, f: F) -> Result<T, StateStoreError>
    where
        F: FnOnce(&mut TransactionHandle) -> Result<T, StateStoreError> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let existing = self.read().await?;
        let mut handle = TransactionHandle::new(existing);
        let result = f(&mut handle)?;
        if let Some(staged) = handle.into_staged() {
            self.write(&staged).await?;
        }
        Ok(result)
    }
}
