//! The shared store holding worker membership and the published assignments.
//!
//! Membership and assignments live in two Redis hashes keyed by worker identity:
//!   - `{prefix}:workers`: worker -> unix seconds of its last heartbeat.
//!   - `{prefix}:assignments`: worker -> JSON array of record identifiers.
use std::collections::HashMap;
use std::future::Future;
use std::time;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::error::CoordinationError;
use crate::types::{Member, RecordId, WorkerId};

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Add `worker` to the registry, or refresh its heartbeat if already present.
    async fn add_member(&self, worker: &WorkerId, heartbeat_at: i64) -> CoordinationResult<()>;

    async fn remove_member(&self, worker: &WorkerId) -> CoordinationResult<()>;

    async fn list_members(&self) -> CoordinationResult<Vec<Member>>;

    async fn is_member(&self, worker: &WorkerId) -> CoordinationResult<bool>;

    /// Overwrite the assignment of `worker`.
    async fn set_assignment(&self, worker: &WorkerId, records: &[RecordId])
        -> CoordinationResult<()>;

    /// The assignment of `worker`, empty when none was published.
    async fn get_assignment(&self, worker: &WorkerId) -> CoordinationResult<Vec<RecordId>>;

    async fn delete_assignment(&self, worker: &WorkerId) -> CoordinationResult<()>;

    /// Workers that currently have an assignment entry.
    async fn assigned_workers(&self) -> CoordinationResult<Vec<WorkerId>>;

    /// Remove every assignment entry.
    async fn clear_assignments(&self) -> CoordinationResult<()>;
}

pub fn encode_assignment(worker: &WorkerId, records: &[RecordId]) -> CoordinationResult<String> {
    serde_json::to_string(records).map_err(|error| CoordinationError::EncodeError {
        worker: worker.to_string(),
        error,
    })
}

pub fn decode_assignment(worker: &WorkerId, raw: &str) -> CoordinationResult<Vec<RecordId>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|error| CoordinationError::DecodeError {
        worker: worker.to_string(),
        error,
    })
}

fn decode_member(worker: String, raw: &str) -> CoordinationResult<Member> {
    match raw.trim().parse::<i64>() {
        Ok(heartbeat_at) => Ok(Member {
            worker: WorkerId(worker),
            heartbeat_at,
        }),
        Err(_) => Err(CoordinationError::InvalidHeartbeat {
            worker,
            value: raw.to_owned(),
        }),
    }
}

/// A `CoordinationStore` backed by Redis. Every command is bounded by `timeout`.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    connection: MultiplexedConnection,
    members_key: String,
    assignments_key: String,
    timeout: time::Duration,
}

impl RedisCoordinationStore {
    /// Connect to Redis and make sure it answers before handing out the store.
    pub async fn new(config: &RedisConfig, timeout: time::Duration) -> CoordinationResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|error| {
            CoordinationError::CommandError {
                command: "CONNECT",
                error,
            }
        })?;

        let connection = with_timeout(
            "CONNECT",
            timeout,
            client.get_multiplexed_async_connection(),
        )
        .await?;

        let store = Self {
            connection,
            members_key: format!("{}:workers", config.key_prefix.as_str()),
            assignments_key: format!("{}:assignments", config.key_prefix.as_str()),
            timeout,
        };
        store.ping().await?;

        Ok(store)
    }

    pub async fn ping(&self) -> CoordinationResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = with_timeout(
            "PING",
            self.timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await?;
        tracing::debug!(response = pong, "redis answered ping");

        Ok(())
    }
}

async fn with_timeout<T, F>(
    command: &'static str,
    timeout: time::Duration,
    fut: F,
) -> CoordinationResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|error| CoordinationError::CommandError { command, error }),
        Err(_) => Err(CoordinationError::Timeout { command, timeout }),
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn add_member(&self, worker: &WorkerId, heartbeat_at: i64) -> CoordinationResult<()> {
        let mut conn = self.connection.clone();
        with_timeout(
            "HSET",
            self.timeout,
            conn.hset::<_, _, _, ()>(&self.members_key, worker.as_str(), heartbeat_at),
        )
        .await
    }

    async fn remove_member(&self, worker: &WorkerId) -> CoordinationResult<()> {
        let mut conn = self.connection.clone();
        with_timeout(
            "HDEL",
            self.timeout,
            conn.hdel::<_, _, ()>(&self.members_key, worker.as_str()),
        )
        .await
    }

    async fn list_members(&self) -> CoordinationResult<Vec<Member>> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = with_timeout(
            "HGETALL",
            self.timeout,
            conn.hgetall(&self.members_key),
        )
        .await?;

        raw.into_iter()
            .map(|(worker, heartbeat)| decode_member(worker, &heartbeat))
            .collect()
    }

    async fn is_member(&self, worker: &WorkerId) -> CoordinationResult<bool> {
        let mut conn = self.connection.clone();
        with_timeout(
            "HEXISTS",
            self.timeout,
            conn.hexists(&self.members_key, worker.as_str()),
        )
        .await
    }

    async fn set_assignment(
        &self,
        worker: &WorkerId,
        records: &[RecordId],
    ) -> CoordinationResult<()> {
        let encoded = encode_assignment(worker, records)?;
        let mut conn = self.connection.clone();
        with_timeout(
            "HSET",
            self.timeout,
            conn.hset::<_, _, _, ()>(&self.assignments_key, worker.as_str(), encoded),
        )
        .await
    }

    async fn get_assignment(&self, worker: &WorkerId) -> CoordinationResult<Vec<RecordId>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = with_timeout(
            "HGET",
            self.timeout,
            conn.hget(&self.assignments_key, worker.as_str()),
        )
        .await?;

        match raw {
            Some(raw) => decode_assignment(worker, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_assignment(&self, worker: &WorkerId) -> CoordinationResult<()> {
        let mut conn = self.connection.clone();
        with_timeout(
            "HDEL",
            self.timeout,
            conn.hdel::<_, _, ()>(&self.assignments_key, worker.as_str()),
        )
        .await
    }

    async fn assigned_workers(&self) -> CoordinationResult<Vec<WorkerId>> {
        let mut conn = self.connection.clone();
        let workers: Vec<String> = with_timeout(
            "HKEYS",
            self.timeout,
            conn.hkeys(&self.assignments_key),
        )
        .await?;

        Ok(workers.into_iter().map(WorkerId).collect())
    }

    async fn clear_assignments(&self) -> CoordinationResult<()> {
        let mut conn = self.connection.clone();
        with_timeout(
            "DEL",
            self.timeout,
            conn.del::<_, ()>(&self.assignments_key),
        )
        .await
    }
}
