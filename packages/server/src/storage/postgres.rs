//! Postgres-backed [`StatusStore`] and [`DetectorCatalog`] via sqlx.
//!
//! One row per request in `detection_status`, upserted by `request_id`;
//! detector names live in the `detectors` table maintained by the worker
//! pool's deployment tooling. Connection failures at boot are fatal by
//! design -- the server must not accept traffic it cannot persist.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;
use verity_core::{OwnerId, RequestId, StatusRecord, Verdict};

use super::detectors::DetectorCatalog;
use super::status_store::{StatusStore, StorageError};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS detection_status (
    request_id UUID PRIMARY KEY,
    status     TEXT NOT NULL,
    verdict    JSONB,
    owner_id   UUID
);
CREATE TABLE IF NOT EXISTS detectors (
    name TEXT PRIMARY KEY
);";

/// Shared Postgres handle implementing both storage traits.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to the database and verifies the connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying sqlx error when the database is unreachable;
    /// callers treat this as a fatal boot condition.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensures the tables exist. Idempotent; run once at boot.
    ///
    /// # Errors
    ///
    /// Returns the underlying sqlx error on DDL failure.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, shared with the pgmq broker when both live on
    /// the same database.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<StatusRecord, StorageError> {
        let request_id: Uuid = row.try_get("request_id")?;
        let status: String = row.try_get("status")?;
        let verdict: Option<serde_json::Value> = row.try_get("verdict")?;
        let owner_id: Option<Uuid> = row.try_get("owner_id")?;

        let verdict = verdict
            .map(serde_json::from_value::<Verdict>)
            .transpose()?;
        Ok(StatusRecord {
            request_id: RequestId::from(request_id),
            status: status.parse()?,
            verdict,
            owner: owner_id.map(OwnerId::from),
        })
    }
}

#[async_trait]
impl StatusStore for PostgresStore {
    async fn set(&self, record: StatusRecord) -> Result<(), StorageError> {
        let verdict = record
            .verdict
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            "INSERT INTO detection_status (request_id, status, verdict, owner_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (request_id) DO UPDATE \
             SET status = EXCLUDED.status, \
                 verdict = EXCLUDED.verdict, \
                 owner_id = EXCLUDED.owner_id",
        )
        .bind(record.request_id.as_uuid())
        .bind(record.status.as_str())
        .bind(verdict)
        .bind(record.owner.map(|o| o.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<StatusRecord, StorageError> {
        let row = sqlx::query(
            "SELECT request_id, status, verdict, owner_id \
             FROM detection_status WHERE request_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(&row),
            None => Ok(StatusRecord::unknown(id)),
        }
    }

    async fn mass(&self, owner: Option<&OwnerId>) -> Result<Vec<StatusRecord>, StorageError> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(
                    "SELECT request_id, status, verdict, owner_id \
                     FROM detection_status WHERE owner_id = $1",
                )
                .bind(owner.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT request_id, status, verdict, owner_id FROM detection_status")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl DetectorCatalog for PostgresStore {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT name FROM detectors ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(StorageError::from))
            .collect()
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 AS present FROM detectors WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
