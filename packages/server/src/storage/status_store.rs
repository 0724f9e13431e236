//! The [`StatusStore`] contract: last-write-wins status persistence.

use async_trait::async_trait;
use verity_core::{OwnerId, RequestId, StatusRecord};

/// Errors surfaced by a storage backend.
///
/// The engine never lets these escape its loop: reads degrade to a
/// synthetic `UNKNOWN` record and writes are logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored verdict is not valid JSON: {0}")]
    CorruptVerdict(#[from] serde_json::Error),

    #[error("stored status string is invalid: {0}")]
    CorruptStatus(#[from] verity_core::types::UnknownStatus),
}

/// Durable, queryable mapping from [`RequestId`] to its current status.
///
/// `set` is an unconditional last-write-wins upsert: no optimistic
/// concurrency, no transition validation. Transition discipline is a
/// contract on the writers (engine and bridge), not on storage.
/// Implementations must be safe under concurrent `set`/`get` without
/// external locking.
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    /// Upserts the record, overwriting any prior record for the same id.
    async fn set(&self, record: StatusRecord) -> Result<(), StorageError>;

    /// Returns the stored record, or a synthesized `{id, UNKNOWN}` when the
    /// id has never been seen. Absence is not an error path.
    async fn get(&self, id: RequestId) -> Result<StatusRecord, StorageError>;

    /// Snapshot enumeration of records, filtered by owner when given.
    ///
    /// No ordering guarantee across request ids.
    async fn mass(&self, owner: Option<&OwnerId>) -> Result<Vec<StatusRecord>, StorageError>;
}
