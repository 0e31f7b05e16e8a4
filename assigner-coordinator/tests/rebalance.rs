use std::collections::BTreeMap;
use std::sync::Arc;

use assigner_common::coordination::CoordinationStore;
use assigner_common::planner::owners;
use assigner_common::test_utils::{MemoryCoordinationStore, MemoryRecordStore};
use assigner_common::types::{now_seconds, RecordId, WorkerId};
use assigner_coordinator::coordinator::{
    Coordinator, CoordinatorConfig, SystemSnapshot, TickOutcome,
};

fn record_owners(
    assignments: &BTreeMap<WorkerId, Vec<RecordId>>,
) -> BTreeMap<RecordId, WorkerId> {
    owners(assignments)
        .into_iter()
        .map(|(record, worker)| (record.clone(), worker.clone()))
        .collect()
}

#[tokio::test]
async fn removing_a_worker_moves_only_its_records() {
    let records = Arc::new(MemoryRecordStore::with_records(["r1", "r2", "r3"]));
    let coordination = Arc::new(MemoryCoordinationStore::default());
    let coordinator = Coordinator::new(
        records.clone(),
        coordination.clone(),
        CoordinatorConfig::default(),
    );
    let a = WorkerId::from("a");
    let b = WorkerId::from("b");
    coordination.add_member(&a, now_seconds()).await.unwrap();
    coordination.add_member(&b, now_seconds()).await.unwrap();
    let mut snapshot = SystemSnapshot::default();

    let outcome = coordinator.tick(&mut snapshot).await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Rehashed {
            workers: 2,
            records: 3
        }
    );

    let before = coordination.assignments();
    let before_owners = record_owners(&before);
    assert_eq!(before_owners.len(), 3, "every record has exactly one owner");
    assert_eq!(before.values().map(Vec::len).sum::<usize>(), 3);

    coordination.remove_member(&b).await.unwrap();
    coordinator.tick(&mut snapshot).await.unwrap();

    let after = coordination.assignments();
    assert_eq!(after.keys().collect::<Vec<_>>(), vec![&a]);
    assert_eq!(
        after[&a],
        vec![RecordId::from("r1"), RecordId::from("r2"), RecordId::from("r3")]
    );
    for record in before.get(&a).into_iter().flatten() {
        assert!(after[&a].contains(record), "{record} left worker a");
    }
}

#[tokio::test]
async fn adding_a_worker_moves_a_fraction_of_records() {
    let ids: Vec<String> = (0..600).map(|n| format!("record-{n}")).collect();
    let records = Arc::new(MemoryRecordStore::with_records(ids.iter().cloned()));
    let coordination = Arc::new(MemoryCoordinationStore::default());
    let coordinator = Coordinator::new(
        records.clone(),
        coordination.clone(),
        CoordinatorConfig::default(),
    );
    for worker in ["w0", "w1", "w2", "w3", "w4"] {
        coordination
            .add_member(&WorkerId::from(worker), now_seconds())
            .await
            .unwrap();
    }
    let mut snapshot = SystemSnapshot::default();
    coordinator.tick(&mut snapshot).await.unwrap();
    let before = record_owners(&coordination.assignments());

    coordination
        .add_member(&WorkerId::from("w5"), now_seconds())
        .await
        .unwrap();
    coordinator.tick(&mut snapshot).await.unwrap();
    let after = record_owners(&coordination.assignments());

    assert_eq!(after.len(), ids.len());
    let moved: Vec<&RecordId> = before
        .keys()
        .filter(|record| before[*record] != after[*record])
        .collect();
    assert!(moved.iter().all(|record| after[*record].as_str() == "w5"));
    // w5 should take about a sixth of the records.
    assert!(
        moved.len() <= ids.len() / 6 * 2,
        "{} of {} records moved",
        moved.len(),
        ids.len()
    );
}

#[tokio::test]
async fn new_records_are_picked_up() {
    let records = Arc::new(MemoryRecordStore::with_records(["r1"]));
    let coordination = Arc::new(MemoryCoordinationStore::default());
    let coordinator = Coordinator::new(
        records.clone(),
        coordination.clone(),
        CoordinatorConfig::default(),
    );
    coordination
        .add_member(&WorkerId::from("a"), now_seconds())
        .await
        .unwrap();
    let mut snapshot = SystemSnapshot::default();
    coordinator.tick(&mut snapshot).await.unwrap();

    records.insert(RecordId::from("r2"));
    let outcome = coordinator.tick(&mut snapshot).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Rehashed {
            workers: 1,
            records: 2
        }
    );
    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(coordination.assignments()[&WorkerId::from("a")].len(), 2);
}
