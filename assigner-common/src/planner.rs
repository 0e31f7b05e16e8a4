use std::collections::{BTreeMap, BTreeSet};

use crate::ring::{ring_hash, HashRing};
use crate::types::{RecordId, WorkerId};

pub type Assignments = BTreeMap<WorkerId, Vec<RecordId>>;

/// What the coordinator should publish after a rehash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Overwrite each worker's entry with its records. Every worker on the ring
    /// has an entry, possibly empty.
    Assign(Assignments),
    /// No workers are left: every existing assignment must be removed.
    Clear,
}

impl Plan {
    pub fn assignments(&self) -> Option<&Assignments> {
        match self {
            Plan::Assign(assignments) => Some(assignments),
            Plan::Clear => None,
        }
    }

    pub fn into_assignments(self) -> Assignments {
        match self {
            Plan::Assign(assignments) => assignments,
            Plan::Clear => Assignments::new(),
        }
    }
}

/// Assign each record to the owner of the first ring position at or after the
/// record's hash, wrapping around to the smallest position.
///
/// Records are visited in sorted order, so each worker's list comes out sorted
/// whatever order `records` was collected in.
pub fn plan<'a, I>(ring: &HashRing, records: I) -> Plan
where
    I: IntoIterator<Item = &'a RecordId>,
{
    if ring.is_empty() {
        return Plan::Clear;
    }

    let mut assignments: Assignments = ring
        .workers()
        .into_iter()
        .map(|worker| (worker.clone(), Vec::new()))
        .collect();

    let records: BTreeSet<&RecordId> = records.into_iter().collect();
    for record in records {
        let Some(owner) = ring.owner_of(ring_hash(record.as_str())) else {
            continue;
        };
        assignments
            .entry(owner.clone())
            .or_default()
            .push(record.clone());
    }

    Plan::Assign(assignments)
}

/// Look up the owner of each record in a published mapping.
pub fn owners(assignments: &Assignments) -> BTreeMap<&RecordId, &WorkerId> {
    assignments
        .iter()
        .flat_map(|(worker, records)| records.iter().map(move |record| (record, worker)))
        .collect()
}
