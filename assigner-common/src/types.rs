use std::fmt;

use serde::{Deserialize, Serialize};

/// The stable identity of a running worker process, usually its pod name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The identifier of a work item. Postgres hands out UUIDs, but nothing outside
/// the record store relies on that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<uuid::Uuid> for RecordId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

/// A row of the `work_items` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: RecordId,
    /// Incremented once per processing pass of the owning worker.
    pub value: i32,
    /// The last worker that touched this item.
    pub current_worker: Option<WorkerId>,
}

/// An entry of the worker registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub worker: WorkerId,
    /// Unix seconds of the last registration or heartbeat.
    pub heartbeat_at: i64,
}

impl Member {
    /// Whether this member's heartbeat is older than `ttl_secs` at `now`.
    /// A zero TTL disables expiry.
    pub fn is_expired(&self, now: i64, ttl_secs: u64) -> bool {
        if ttl_secs == 0 {
            return false;
        }
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.saturating_sub(self.heartbeat_at) > ttl
    }
}

pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
