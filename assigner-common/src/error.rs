use std::time;

use thiserror::Error;

/// Enumeration of errors for operations against the record store.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError {
        command: &'static str,
        error: sqlx::Error,
    },
    #[error("migration failed with: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("record store is unavailable")]
    Unavailable,
}

/// Enumeration of errors for operations against the coordination store.
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("{command} command failed with: {error}")]
    CommandError {
        command: &'static str,
        error: redis::RedisError,
    },
    #[error("{command} command timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: time::Duration,
    },
    #[error("assignment of worker {worker} could not be decoded: {error}")]
    DecodeError {
        worker: String,
        error: serde_json::Error,
    },
    #[error("assignment of worker {worker} could not be encoded: {error}")]
    EncodeError {
        worker: String,
        error: serde_json::Error,
    },
    #[error("heartbeat of worker {worker} is not a timestamp: {value}")]
    InvalidHeartbeat { worker: String, value: String },
    #[error("coordination store is unavailable")]
    Unavailable,
}
