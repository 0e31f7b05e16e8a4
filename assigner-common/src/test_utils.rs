//! In-memory stores for exercising the loops without Postgres or Redis.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::coordination::{CoordinationResult, CoordinationStore};
use crate::error::{CoordinationError, RecordStoreError};
use crate::records::{RecordBootstrap, RecordStore, RecordStoreResult};
use crate::types::{Member, RecordId, WorkItem, WorkerId};

#[derive(Default)]
pub struct MemoryRecordStore {
    items: Mutex<BTreeMap<RecordId, WorkItem>>,
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    pub fn with_records<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        for id in ids {
            store.insert(RecordId::new(id));
        }
        store
    }

    pub fn insert(&self, id: RecordId) {
        let item = WorkItem {
            id: id.clone(),
            value: 0,
            current_worker: None,
        };
        self.items.lock().unwrap().insert(id, item);
    }

    pub fn remove(&self, id: &RecordId) -> Option<WorkItem> {
        self.items.lock().unwrap().remove(id)
    }

    pub fn get(&self, id: &RecordId) -> Option<WorkItem> {
        self.items.lock().unwrap().get(id).cloned()
    }

    /// Make every following call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> RecordStoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RecordStoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_ids(&self) -> RecordStoreResult<Vec<RecordId>> {
        self.check_available()?;
        Ok(self.items.lock().unwrap().keys().cloned().collect())
    }

    async fn count(&self) -> RecordStoreResult<i64> {
        self.check_available()?;
        Ok(self.items.lock().unwrap().len() as i64)
    }

    async fn touch(&self, id: &RecordId, worker: &WorkerId) -> RecordStoreResult<u64> {
        self.check_available()?;
        match self.items.lock().unwrap().get_mut(id) {
            Some(item) => {
                item.value += 1;
                item.current_worker = Some(worker.clone());
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl RecordBootstrap for MemoryRecordStore {
    async fn migrate(&self) -> RecordStoreResult<()> {
        self.check_available()
    }

    async fn reset(&self) -> RecordStoreResult<u64> {
        self.check_available()?;
        let mut items = self.items.lock().unwrap();
        let removed = items.len() as u64;
        items.clear();
        Ok(removed)
    }

    async fn seed(&self, count: u32) -> RecordStoreResult<u64> {
        self.check_available()?;
        for _ in 0..count {
            self.insert(RecordId::from(uuid::Uuid::now_v7()));
        }
        Ok(u64::from(count))
    }
}

#[derive(Default)]
pub struct MemoryCoordinationStore {
    members: Mutex<BTreeMap<WorkerId, i64>>,
    assignments: Mutex<BTreeMap<WorkerId, Vec<RecordId>>>,
    unavailable: AtomicBool,
    writes_unavailable: AtomicBool,
}

impl MemoryCoordinationStore {
    /// Make every following call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes fail while reads keep working.
    pub fn set_writes_unavailable(&self, unavailable: bool) {
        self.writes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn assignments(&self) -> BTreeMap<WorkerId, Vec<RecordId>> {
        self.assignments.lock().unwrap().clone()
    }

    pub fn members(&self) -> BTreeMap<WorkerId, i64> {
        self.members.lock().unwrap().clone()
    }

    fn check_available(&self) -> CoordinationResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CoordinationError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> CoordinationResult<()> {
        self.check_available()?;
        if self.writes_unavailable.load(Ordering::SeqCst) {
            Err(CoordinationError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn add_member(&self, worker: &WorkerId, heartbeat_at: i64) -> CoordinationResult<()> {
        self.check_writable()?;
        self.members
            .lock()
            .unwrap()
            .insert(worker.clone(), heartbeat_at);
        Ok(())
    }

    async fn remove_member(&self, worker: &WorkerId) -> CoordinationResult<()> {
        self.check_writable()?;
        self.members.lock().unwrap().remove(worker);
        Ok(())
    }

    async fn list_members(&self) -> CoordinationResult<Vec<Member>> {
        self.check_available()?;
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .map(|(worker, heartbeat_at)| Member {
                worker: worker.clone(),
                heartbeat_at: *heartbeat_at,
            })
            .collect())
    }

    async fn is_member(&self, worker: &WorkerId) -> CoordinationResult<bool> {
        self.check_available()?;
        Ok(self.members.lock().unwrap().contains_key(worker))
    }

    async fn set_assignment(
        &self,
        worker: &WorkerId,
        records: &[RecordId],
    ) -> CoordinationResult<()> {
        self.check_writable()?;
        self.assignments
            .lock()
            .unwrap()
            .insert(worker.clone(), records.to_vec());
        Ok(())
    }

    async fn get_assignment(&self, worker: &WorkerId) -> CoordinationResult<Vec<RecordId>> {
        self.check_available()?;
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .get(worker)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_assignment(&self, worker: &WorkerId) -> CoordinationResult<()> {
        self.check_writable()?;
        self.assignments.lock().unwrap().remove(worker);
        Ok(())
    }

    async fn assigned_workers(&self) -> CoordinationResult<Vec<WorkerId>> {
        self.check_available()?;
        Ok(self.assignments.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_assignments(&self) -> CoordinationResult<()> {
        self.check_writable()?;
        self.assignments.lock().unwrap().clear();
        Ok(())
    }
}
