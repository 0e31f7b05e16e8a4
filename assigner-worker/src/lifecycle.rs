//! Membership of a worker in the shared registry.
use std::sync::Arc;
use std::time;

use assigner_common::coordination::{CoordinationResult, CoordinationStore};
use assigner_common::types::{now_seconds, WorkerId};
use tokio::signal;
use tracing::{info, warn};

use crate::error::WorkerError;

pub struct Lifecycle {
    worker: WorkerId,
    coordination: Arc<dyn CoordinationStore>,
}

impl Lifecycle {
    pub fn new(worker: WorkerId, coordination: Arc<dyn CoordinationStore>) -> Self {
        Self {
            worker,
            coordination,
        }
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Add this worker to the registry.
    ///
    /// A newly registered worker starts with an empty assignment, written before
    /// the worker becomes a member so it can never overwrite an assignment the
    /// coordinator published for it. Registering an identity that is already
    /// present only refreshes its heartbeat and leaves its assignment in place,
    /// since the coordinator would not republish it.
    pub async fn register(&self) -> Result<(), WorkerError> {
        self.try_register()
            .await
            .map_err(|error| WorkerError::RegistrationError {
                worker: self.worker.to_string(),
                error,
            })
    }

    async fn try_register(&self) -> CoordinationResult<()> {
        let already_registered = self.coordination.is_member(&self.worker).await?;

        if !already_registered {
            self.coordination.set_assignment(&self.worker, &[]).await?;
        }

        self.coordination
            .add_member(&self.worker, now_seconds())
            .await?;

        if already_registered {
            info!(worker = %self.worker, "worker was already registered");
        } else {
            info!(worker = %self.worker, "registered worker");
        }

        Ok(())
    }

    /// Refresh the heartbeat of this worker, registering it again if it was evicted.
    pub async fn heartbeat(&self) -> Result<(), WorkerError> {
        let registered = self
            .coordination
            .is_member(&self.worker)
            .await
            .map_err(|error| WorkerError::RegistrationError {
                worker: self.worker.to_string(),
                error,
            })?;

        if !registered {
            warn!(worker = %self.worker, "worker missing from the registry, registering again");
            return self.register().await;
        }

        self.coordination
            .add_member(&self.worker, now_seconds())
            .await
            .map_err(|error| WorkerError::RegistrationError {
                worker: self.worker.to_string(),
                error,
            })
    }

    /// Remove this worker and its assignment from the registry.
    ///
    /// Best effort: failures and timeouts are logged and reported through the return
    /// value, never retried. Returns whether the worker was fully deregistered.
    pub async fn deregister(&self, timeout: time::Duration) -> bool {
        let result = tokio::time::timeout(timeout, async {
            self.coordination.remove_member(&self.worker).await?;
            self.coordination.delete_assignment(&self.worker).await
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!(worker = %self.worker, "deregistered worker");
                true
            }
            Ok(Err(e)) => {
                warn!(worker = %self.worker, error = %e, "failed to deregister worker");
                false
            }
            Err(_) => {
                warn!(worker = %self.worker, ?timeout, "timed out deregistering worker");
                false
            }
        }
    }
}

/// SIGTERM and SIGINT handlers, installed when this is created. A signal that
/// arrives before `recv` is polled is still delivered to it.
pub struct ShutdownSignal {
    term: signal::unix::Signal,
    interrupt: signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> std::io::Result<Self> {
        let term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        Ok(Self { term, interrupt })
    }

    /// Resolve once the process receives SIGTERM or SIGINT.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.term.recv() => info!("received SIGTERM"),
            _ = self.interrupt.recv() => info!("received SIGINT"),
        };
    }
}
