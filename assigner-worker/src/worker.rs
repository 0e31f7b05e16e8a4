use std::sync::Arc;
use std::time;

use assigner_common::coordination::CoordinationStore;
use assigner_common::records::RecordStore;
use tracing::{error, info, warn};

use crate::error::WorkerError;
use crate::lifecycle::Lifecycle;

/// Counts of one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Records in the assignment that was read.
    pub assigned: usize,
    /// Mutations that went through, whether or not they matched a row.
    pub processed: usize,
    pub rows_affected: u64,
    /// Mutations that failed and were skipped.
    pub failed: usize,
}

/// A worker that repeatedly applies its published assignment to the record store.
///
/// Nothing acknowledges a processed record: as long as the assignment stays the
/// same, every pass increments the same counters again.
pub struct AssignmentWorker {
    lifecycle: Lifecycle,
    records: Arc<dyn RecordStore>,
    coordination: Arc<dyn CoordinationStore>,
}

impl AssignmentWorker {
    pub fn new(
        lifecycle: Lifecycle,
        records: Arc<dyn RecordStore>,
        coordination: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            lifecycle,
            records,
            coordination,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Process the assignment every `interval`, forever. Passes never overlap.
    pub async fn run(&self, interval: time::Duration) {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if let Err(e) = self.tick().await {
                error!(error = %e, "worker tick failed");
                metrics::counter!("assigner_worker_tick_errors_total").increment(1);
            }
        }
    }

    /// Heartbeat, read the current assignment and apply one mutation per record.
    pub async fn tick(&self) -> Result<ProcessReport, WorkerError> {
        let worker = self.lifecycle.worker();
        let start = time::Instant::now();

        if let Err(e) = self.lifecycle.heartbeat().await {
            warn!(error = %e, "heartbeat failed");
        }

        let assignment = self
            .coordination
            .get_assignment(worker)
            .await
            .map_err(|error| WorkerError::ReadAssignmentError {
                worker: worker.to_string(),
                error,
            })?;
        info!(worker = %worker, records = assignment.len(), "processing assignment");

        let mut report = ProcessReport {
            assigned: assignment.len(),
            ..Default::default()
        };

        for id in &assignment {
            match self.records.touch(id, worker).await {
                Ok(rows) => {
                    report.processed += 1;
                    report.rows_affected += rows;
                    if rows == 0 {
                        warn!(record = %id, "no work item matched the assigned record");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(record = %id, error = %e, "failed to update work item");
                }
            }
        }

        metrics::counter!("assigner_worker_records_processed_total")
            .increment(report.processed as u64);
        metrics::counter!("assigner_worker_rows_affected_total").increment(report.rows_affected);
        metrics::counter!("assigner_worker_record_errors_total").increment(report.failed as u64);
        metrics::histogram!("assigner_worker_tick_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        info!(
            worker = %worker,
            processed = report.processed,
            rows_affected = report.rows_affected,
            failed = report.failed,
            "finished processing assignment"
        );

        Ok(report)
    }
}
