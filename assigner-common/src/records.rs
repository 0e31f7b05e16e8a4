//! The durable store of work items.
use std::time;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::error::RecordStoreError;
use crate::types::{RecordId, WorkerId};

pub type RecordStoreResult<T> = std::result::Result<T, RecordStoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Identifiers of every work item currently in the store.
    async fn list_ids(&self) -> RecordStoreResult<Vec<RecordId>>;

    async fn count(&self) -> RecordStoreResult<i64>;

    /// Increment the counter of a work item and mark it as last touched by `worker`.
    /// Returns the number of rows affected, which is 0 when the item does not exist.
    async fn touch(&self, id: &RecordId, worker: &WorkerId) -> RecordStoreResult<u64>;
}

/// Schema setup and seeding, run once by the coordinator before its loop starts.
#[async_trait]
pub trait RecordBootstrap: Send + Sync {
    /// Create the `work_items` table if it does not exist yet.
    async fn migrate(&self) -> RecordStoreResult<()>;

    /// Delete every work item, returning how many were removed.
    async fn reset(&self) -> RecordStoreResult<u64>;

    /// Insert `count` work items with default values.
    async fn seed(&self, count: u32) -> RecordStoreResult<u64>;
}

/// A `RecordStore` backed by the `work_items` table in PostgreSQL.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Connect to PostgreSQL. Waiting for a pooled connection is bounded by `timeout`.
    pub async fn new(config: &PostgresConfig, timeout: time::Duration) -> RecordStoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|error| RecordStoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn list_ids(&self) -> RecordStoreResult<Vec<RecordId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM work_items")
            .fetch_all(&self.pool)
            .await
            .map_err(|error| RecordStoreError::QueryError {
                command: "SELECT",
                error,
            })?;

        Ok(ids.into_iter().map(RecordId::from).collect())
    }

    async fn count(&self) -> RecordStoreResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM work_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| RecordStoreError::QueryError {
                command: "SELECT",
                error,
            })
    }

    async fn touch(&self, id: &RecordId, worker: &WorkerId) -> RecordStoreResult<u64> {
        // Anything that is not a UUID cannot match a row.
        let Ok(uuid) = Uuid::parse_str(id.as_str()) else {
            return Ok(0);
        };

        let result = sqlx::query(
            "UPDATE work_items SET value = value + 1, current_worker = $1 WHERE id = $2",
        )
        .bind(worker.as_str())
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|error| RecordStoreError::QueryError {
            command: "UPDATE",
            error,
        })?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordBootstrap for PgRecordStore {
    async fn migrate(&self) -> RecordStoreResult<()> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn reset(&self) -> RecordStoreResult<u64> {
        let result = sqlx::query("DELETE FROM work_items")
            .execute(&self.pool)
            .await
            .map_err(|error| RecordStoreError::QueryError {
                command: "DELETE",
                error,
            })?;

        Ok(result.rows_affected())
    }

    async fn seed(&self, count: u32) -> RecordStoreResult<u64> {
        let result = sqlx::query(
            "INSERT INTO work_items (value) SELECT 0 FROM generate_series(1, $1::integer)",
        )
        .bind(i32::try_from(count).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(|error| RecordStoreError::QueryError {
            command: "INSERT",
            error,
        })?;

        Ok(result.rows_affected())
    }
}
