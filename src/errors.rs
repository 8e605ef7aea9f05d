//! Structured error types for the scheduler.
//!
//! One enum per concern, each with a `Display` + `std::error::Error`
//! implementation and `From` conversions into the top-level
//! `SchedulerError`.

use crate::cron::CronParseError;
use std::fmt;

/// Errors `initialize` can return, synchronous and typed.
#[derive(Debug)]
pub enum RegistrationError {
    /// The registration list itself was empty-but-invalid shaped input
    /// (kept distinct from `Shape` because it names the whole collection,
    /// not one entry).
    NotAnArray,

    /// A single registration tuple had the wrong arity.
    Shape { index: usize },

    /// A task name was missing, not a string, or blank after trimming.
    InvalidName { index: usize },

    /// Two registrations shared the same task name.
    DuplicateTaskName { name: String },

    /// The cron expression field was missing or empty.
    InvalidCronType { index: usize, name: String },

    /// The cron expression field did not parse.
    CronExpressionInvalid {
        name: String,
        value: String,
        source: CronParseError,
    },

    /// The callback slot was not a callable value.
    CallbackType { index: usize, name: String },

    /// The retry delay field was not a non-negative integer.
    RetryDelayType { index: usize, name: String },

    /// The retry delay field parsed but was negative.
    NegativeRetryDelay { name: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::NotAnArray => {
                write!(f, "registrations must be provided as a list of tuples")
            }
            RegistrationError::Shape { index } => {
                write!(f, "registration at index {} has the wrong shape", index)
            }
            RegistrationError::InvalidName { index } => {
                write!(f, "registration at index {} has a missing or blank name", index)
            }
            RegistrationError::DuplicateTaskName { name } => {
                write!(f, "duplicate task name '{}'", name)
            }
            RegistrationError::InvalidCronType { index, name } => write!(
                f,
                "registration '{}' (index {}) is missing a cron expression",
                name, index
            ),
            RegistrationError::CronExpressionInvalid { name, value, source } => write!(
                f,
                "task '{}' has an invalid cron expression '{}': {}",
                name, value, source
            ),
            RegistrationError::CallbackType { index, name } => write!(
                f,
                "registration '{}' (index {}) does not have a callable callback",
                name, index
            ),
            RegistrationError::RetryDelayType { index, name } => write!(
                f,
                "registration '{}' (index {}) has a non-numeric retry delay",
                name, index
            ),
            RegistrationError::NegativeRetryDelay { name } => {
                write!(f, "task '{}' has a negative retry delay", name)
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Errors from the durable state store.
#[derive(Debug)]
pub enum StateStoreError {
    /// The underlying storage backend failed to commit.
    CommitFailed { reason: String },

    /// The persisted document could not be decoded (treated as absent per
    /// "version mismatch on read"), surfaced here only when the caller
    /// explicitly asked to distinguish it from a clean-slate start.
    DecodeFailed { reason: String },

    /// A transaction was reused after it had already committed or failed.
    HandleAlreadyConsumed,
}

impl fmt::Display for StateStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateStoreError::CommitFailed { reason } => {
                write!(f, "state store commit failed: {}", reason)
            }
            StateStoreError::DecodeFailed { reason } => {
                write!(f, "failed to decode persisted scheduler state: {}", reason)
            }
            StateStoreError::HandleAlreadyConsumed => {
                write!(f, "transaction handle used after commit")
            }
        }
    }
}

impl std::error::Error for StateStoreError {}

/// Top-level scheduler error uniting the sub-error families.
#[derive(Debug)]
pub enum SchedulerError {
    Registration(RegistrationError),
    StateTransactionFailure(StateStoreError),
    AlreadyRunning,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Registration(e) => write!(f, "registration error: {}", e),
            SchedulerError::StateTransactionFailure(e) => {
                write!(f, "state transaction failure: {}", e)
            }
            SchedulerError::AlreadyRunning => write!(f, "scheduler is already running"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<RegistrationError> for SchedulerError {
    fn from(err: RegistrationError) -> Self {
        SchedulerError::Registration(err)
    }
}

impl From<StateStoreError> for SchedulerError {
    fn from(err: StateStoreError) -> Self {
        SchedulerError::StateTransactionFailure(err)
    }
}

impl From<sqlx::Error> for StateStoreError {
    fn from(err: sqlx::Error) -> Self {
        StateStoreError::CommitFailed { reason: err.to_string() }
    }
}
