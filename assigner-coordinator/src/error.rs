use assigner_common::error::{CoordinationError, RecordStoreError};
use thiserror::Error;

/// Enumeration of errors that abandon a coordinator tick.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("failed to read work items: {0}")]
    RecordStoreError(#[from] RecordStoreError),
    #[error("failed to read workers: {0}")]
    ReadWorkersError(CoordinationError),
    #[error("failed to publish assignments: {0}")]
    PublishError(CoordinationError),
}
