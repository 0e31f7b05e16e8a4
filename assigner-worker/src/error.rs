use assigner_common::error::CoordinationError;
use thiserror::Error;

/// Enumeration of errors related to registering a worker and reading its assignment.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to register worker {worker}: {error}")]
    RegistrationError {
        worker: String,
        error: CoordinationError,
    },
    #[error("failed to read the assignment of worker {worker}: {error}")]
    ReadAssignmentError {
        worker: String,
        error: CoordinationError,
    },
}
