use std::collections::BTreeSet;
use std::sync::Arc;
use std::time;

use assigner_common::coordination::CoordinationStore;
use assigner_common::planner::{self, Assignments, Plan};
use assigner_common::records::RecordStore;
use assigner_common::ring::{HashRing, DEFAULT_VIRTUAL_NODES};
use assigner_common::types::{now_seconds, Member, RecordId, WorkerId};
use tracing::{error, info, warn};

use crate::error::CoordinatorError;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Ring positions per worker.
    pub virtual_nodes: u32,
    /// Members whose heartbeat is older than this are evicted. 0 disables expiry.
    pub worker_lease_ttl_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            worker_lease_ttl_secs: 0,
        }
    }
}

/// What the coordinator saw on its last successful tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub workers: BTreeSet<WorkerId>,
    pub records: BTreeSet<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Neither workers nor records changed, nothing was published.
    Unchanged,
    /// The assignment was recomputed and published in full.
    Rehashed { workers: usize, records: usize },
    /// No workers are left and every assignment was removed.
    Cleared,
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Unchanged => "unchanged",
            TickOutcome::Rehashed { .. } => "rehashed",
            TickOutcome::Cleared => "cleared",
        }
    }
}

pub struct Coordinator {
    records: Arc<dyn RecordStore>,
    coordination: Arc<dyn CoordinationStore>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        coordination: Arc<dyn CoordinationStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            records,
            coordination,
            config,
        }
    }

    /// Tick every `interval` until the process exits. A tick never overlaps the
    /// previous one, and a failed tick is only logged.
    pub async fn run(&self, interval: time::Duration) {
        let mut snapshot = SystemSnapshot::default();
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.tick(&mut snapshot).await {
                Ok(outcome) => {
                    metrics::counter!("assigner_coordinator_ticks_total", "outcome" => outcome.label())
                        .increment(1);
                }
                Err(e) => {
                    error!(error = %e, "coordinator tick failed");
                    metrics::counter!("assigner_coordinator_ticks_total", "outcome" => "failed")
                        .increment(1);
                }
            }
        }
    }

    /// Compare the current workers and records against `previous` and republish
    /// the assignment if either changed.
    ///
    /// `previous` is only replaced when the tick succeeds, so a tick that fails
    /// to read or to publish is attempted again in full on the next call.
    pub async fn tick(
        &self,
        previous: &mut SystemSnapshot,
    ) -> Result<TickOutcome, CoordinatorError> {
        let current = self.observe().await?;
        let changed = current != *previous;

        metrics::gauge!("assigner_workers").set(current.workers.len() as f64);
        metrics::gauge!("assigner_records").set(current.records.len() as f64);
        info!(
            workers = current.workers.len(),
            previous_workers = previous.workers.len(),
            records = current.records.len(),
            previous_records = previous.records.len(),
            changed,
            "system status"
        );

        if !changed {
            return Ok(TickOutcome::Unchanged);
        }

        info!("change detected, rehashing");
        let outcome = self.rehash(&current).await?;
        *previous = current;

        Ok(outcome)
    }

    /// Build the ring over `snapshot.workers`, assign `snapshot.records` and publish
    /// the result, overwriting every existing entry.
    pub async fn rehash(&self, snapshot: &SystemSnapshot) -> Result<TickOutcome, CoordinatorError> {
        let start = time::Instant::now();
        let ring = HashRing::build(&snapshot.workers, self.config.virtual_nodes);

        let outcome = match planner::plan(&ring, &snapshot.records) {
            Plan::Clear => {
                self.coordination
                    .clear_assignments()
                    .await
                    .map_err(CoordinatorError::PublishError)?;
                warn!("no workers registered, cleared all assignments");
                TickOutcome::Cleared
            }
            Plan::Assign(assignments) => {
                self.publish(&assignments).await?;
                TickOutcome::Rehashed {
                    workers: assignments.len(),
                    records: snapshot.records.len(),
                }
            }
        };

        metrics::histogram!("assigner_rehash_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        Ok(outcome)
    }

    async fn publish(&self, assignments: &Assignments) -> Result<(), CoordinatorError> {
        for (worker, records) in assignments {
            self.coordination
                .set_assignment(worker, records)
                .await
                .map_err(CoordinatorError::PublishError)?;
            info!(worker = %worker, records = records.len(), "published assignment");
        }

        // Entries of workers that left would otherwise keep their last assignment.
        let assigned = self
            .coordination
            .assigned_workers()
            .await
            .map_err(CoordinatorError::PublishError)?;
        for worker in assigned {
            if !assignments.contains_key(&worker) {
                self.coordination
                    .delete_assignment(&worker)
                    .await
                    .map_err(CoordinatorError::PublishError)?;
                info!(worker = %worker, "removed assignment of departed worker");
            }
        }

        Ok(())
    }

    async fn observe(&self) -> Result<SystemSnapshot, CoordinatorError> {
        let members = self
            .coordination
            .list_members()
            .await
            .map_err(CoordinatorError::ReadWorkersError)?;
        let workers = self.live_workers(members).await;

        let records = self.records.list_ids().await?.into_iter().collect();

        Ok(SystemSnapshot { workers, records })
    }

    /// Drop members whose lease expired, evicting them from the registry on a
    /// best-effort basis.
    async fn live_workers(&self, members: Vec<Member>) -> BTreeSet<WorkerId> {
        let ttl = self.config.worker_lease_ttl_secs;
        let now = now_seconds();
        let mut workers = BTreeSet::new();

        for member in members {
            if !member.is_expired(now, ttl) {
                workers.insert(member.worker);
                continue;
            }

            warn!(
                worker = %member.worker,
                heartbeat_at = member.heartbeat_at,
                "worker lease expired, evicting"
            );
            metrics::counter!("assigner_workers_evicted_total").increment(1);
            if let Err(e) = self.coordination.remove_member(&member.worker).await {
                warn!(worker = %member.worker, error = %e, "failed to evict worker");
            }
            if let Err(e) = self.coordination.delete_assignment(&member.worker).await {
                warn!(
                    worker = %member.worker,
                    error = %e,
                    "failed to delete assignment of evicted worker"
                );
            }
        }

        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assigner_common::test_utils::{MemoryCoordinationStore, MemoryRecordStore};

    struct Fixture {
        records: Arc<MemoryRecordStore>,
        coordination: Arc<MemoryCoordinationStore>,
        coordinator: Coordinator,
    }

    fn fixture(records: &[&str], config: CoordinatorConfig) -> Fixture {
        let records = Arc::new(MemoryRecordStore::with_records(records.iter().copied()));
        let coordination = Arc::new(MemoryCoordinationStore::default());
        let coordinator = Coordinator::new(records.clone(), coordination.clone(), config);

        Fixture {
            records,
            coordination,
            coordinator,
        }
    }

    async fn join(fixture: &Fixture, worker: &str) {
        fixture
            .coordination
            .add_member(&WorkerId::from(worker), now_seconds())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_tick_with_workers_rehashes() {
        let fixture = fixture(&["r1", "r2", "r3"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();

        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Rehashed {
                workers: 1,
                records: 3
            }
        );
        assert_eq!(snapshot.workers.len(), 1);
        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(
            fixture.coordination.assignments()[&WorkerId::from("a")],
            vec![RecordId::from("r1"), RecordId::from("r2"), RecordId::from("r3")]
        );
    }

    #[tokio::test]
    async fn unchanged_sets_do_not_republish() {
        let fixture = fixture(&["r1", "r2"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();
        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        // Tamper with the published entry: an unchanged tick must leave it alone.
        fixture
            .coordination
            .set_assignment(&WorkerId::from("a"), &[])
            .await
            .unwrap();

        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();

        assert_eq!(outcome, TickOutcome::Unchanged);
        assert!(fixture.coordination.assignments()[&WorkerId::from("a")].is_empty());
    }

    #[tokio::test]
    async fn same_sizes_with_different_members_is_a_change() {
        let fixture = fixture(&["r1", "r2"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();
        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        fixture.records.remove(&"r1".into());
        fixture.records.insert("r3".into());

        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Rehashed { .. }));
        assert_eq!(
            fixture.coordination.assignments()[&WorkerId::from("a")],
            vec![RecordId::from("r2"), RecordId::from("r3")]
        );
    }

    #[tokio::test]
    async fn last_worker_leaving_clears_assignments() {
        let fixture = fixture(&["r1"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();
        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        fixture
            .coordination
            .remove_member(&WorkerId::from("a"))
            .await
            .unwrap();
        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();

        assert_eq!(outcome, TickOutcome::Cleared);
        assert!(fixture.coordination.assignments().is_empty());
        assert!(snapshot.workers.is_empty());
    }

    #[tokio::test]
    async fn departed_worker_entries_are_removed() {
        let fixture = fixture(&["r1", "r2", "r3"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        join(&fixture, "b").await;
        let mut snapshot = SystemSnapshot::default();
        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        fixture
            .coordination
            .remove_member(&WorkerId::from("b"))
            .await
            .unwrap();
        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        let assignments = fixture.coordination.assignments();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[&WorkerId::from("a")].len(), 3);
    }

    #[tokio::test]
    async fn failed_read_keeps_the_snapshot() {
        let fixture = fixture(&["r1"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();

        fixture.records.set_unavailable(true);
        let result = fixture.coordinator.tick(&mut snapshot).await;
        assert!(matches!(result, Err(CoordinatorError::RecordStoreError(_))));
        assert_eq!(snapshot, SystemSnapshot::default());

        fixture.coordination.set_unavailable(true);
        fixture.records.set_unavailable(false);
        let result = fixture.coordinator.tick(&mut snapshot).await;
        assert!(matches!(result, Err(CoordinatorError::ReadWorkersError(_))));
        assert_eq!(snapshot, SystemSnapshot::default());

        fixture.coordination.set_unavailable(false);
        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Rehashed { .. }));
    }

    #[tokio::test]
    async fn failed_publish_is_retried_next_tick() {
        let fixture = fixture(&["r1", "r2"], CoordinatorConfig::default());
        join(&fixture, "a").await;
        let mut snapshot = SystemSnapshot::default();

        fixture.coordination.set_writes_unavailable(true);
        let result = fixture.coordinator.tick(&mut snapshot).await;
        assert!(matches!(result, Err(CoordinatorError::PublishError(_))));
        assert_eq!(snapshot, SystemSnapshot::default());
        assert!(fixture.coordination.assignments().is_empty());

        fixture.coordination.set_writes_unavailable(false);
        let outcome = fixture.coordinator.tick(&mut snapshot).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Rehashed { .. }));
        assert_eq!(fixture.coordination.assignments()[&WorkerId::from("a")].len(), 2);
    }

    #[tokio::test]
    async fn expired_members_are_evicted() {
        let config = CoordinatorConfig {
            worker_lease_ttl_secs: 30,
            ..Default::default()
        };
        let fixture = fixture(&["r1", "r2"], config);
        join(&fixture, "a").await;
        fixture
            .coordination
            .add_member(&WorkerId::from("stale"), now_seconds() - 3600)
            .await
            .unwrap();
        fixture
            .coordination
            .set_assignment(&WorkerId::from("stale"), &[RecordId::from("r1")])
            .await
            .unwrap();
        let mut snapshot = SystemSnapshot::default();

        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        assert_eq!(
            snapshot.workers,
            BTreeSet::from([WorkerId::from("a")])
        );
        assert!(!fixture
            .coordination
            .members()
            .contains_key(&WorkerId::from("stale")));
        let assignments = fixture.coordination.assignments();
        assert_eq!(assignments.keys().collect::<Vec<_>>(), vec![&WorkerId::from("a")]);
        assert_eq!(assignments[&WorkerId::from("a")].len(), 2);
    }

    #[tokio::test]
    async fn stale_members_count_without_a_lease() {
        let fixture = fixture(&["r1"], CoordinatorConfig::default());
        fixture
            .coordination
            .add_member(&WorkerId::from("stale"), 0)
            .await
            .unwrap();
        let mut snapshot = SystemSnapshot::default();

        fixture.coordinator.tick(&mut snapshot).await.unwrap();

        assert!(snapshot.workers.contains(&WorkerId::from("stale")));
    }

    #[tokio::test]
    async fn coordinators_do_not_share_state() {
        let first = fixture(&["r1"], CoordinatorConfig::default());
        let second = fixture(&["r1"], CoordinatorConfig::default());
        join(&first, "a").await;
        join(&second, "a").await;

        let mut first_snapshot = SystemSnapshot::default();
        let mut second_snapshot = SystemSnapshot::default();
        first.coordinator.tick(&mut first_snapshot).await.unwrap();

        let outcome = second.coordinator.tick(&mut second_snapshot).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Rehashed { .. }));
    }
}
