//! In-memory [`StatusStore`] backed by [`DashMap`].
//!
//! Concurrent read/write access without external locking; the default
//! backend for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use verity_core::{OwnerId, RequestId, StatusRecord};

use super::status_store::{StatusStore, StorageError};

/// In-memory status storage with fine-grained internal sharding.
///
/// Reads are lock-free and writes shard-local (via `DashMap`), so engine
/// writes and mass-query snapshots can proceed concurrently.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: DashMap<RequestId, StatusRecord>,
}

impl MemoryStatusStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn set(&self, record: StatusRecord) -> Result<(), StorageError> {
        self.records.insert(record.request_id, record);
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<StatusRecord, StorageError> {
        Ok(self
            .records
            .get(&id)
            .map_or_else(|| StatusRecord::unknown(id), |r| r.clone()))
    }

    async fn mass(&self, owner: Option<&OwnerId>) -> Result<Vec<StatusRecord>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| owner.is_none() || entry.value().owner.as_ref() == owner)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use verity_core::{Label, Status, Verdict};

    use super::*;

    fn finished(id: RequestId) -> StatusRecord {
        StatusRecord {
            request_id: id,
            status: Status::Finished,
            verdict: Some(Verdict {
                labels: vec![Label {
                    label: "ai-generated".to_string(),
                    probability: 0.9,
                }],
            }),
            owner: None,
        }
    }

    #[tokio::test]
    async fn get_of_unseen_id_synthesizes_unknown() {
        let store = MemoryStatusStore::new();
        let id = RequestId::mint();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.request_id, id);
        assert_eq!(record.status, Status::Unknown);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_is_last_write_wins() {
        let store = MemoryStatusStore::new();
        let id = RequestId::mint();

        store.set(StatusRecord::pending(id, None)).await.unwrap();
        store.set(finished(id)).await.unwrap();
        // Overwriting a terminal record is permitted: the store enforces no
        // transition discipline.
        store
            .set(StatusRecord::bare(id, Status::InProgress))
            .await
            .unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.status, Status::InProgress);
        assert!(record.verdict.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn repeated_terminal_writes_are_idempotent() {
        let store = MemoryStatusStore::new();
        let id = RequestId::mint();

        store.set(finished(id)).await.unwrap();
        let after_first = store.get(id).await.unwrap();
        store.set(finished(id)).await.unwrap();
        let after_second = store.get(id).await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn mass_filters_by_owner() {
        let store = MemoryStatusStore::new();
        let alice = OwnerId::from(Uuid::new_v4());
        let bob = OwnerId::from(Uuid::new_v4());

        let a = RequestId::mint();
        store
            .set(StatusRecord::pending(a, Some(alice)))
            .await
            .unwrap();
        store
            .set(StatusRecord::pending(RequestId::mint(), Some(bob)))
            .await
            .unwrap();
        store
            .set(StatusRecord::pending(RequestId::mint(), None))
            .await
            .unwrap();

        let all = store.mass(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let alices = store.mass(Some(&alice)).await.unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].request_id, a);
    }

    #[tokio::test]
    async fn concurrent_writers_never_corrupt_each_other() {
        let store = std::sync::Arc::new(MemoryStatusStore::new());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = RequestId::mint();
                store.set(StatusRecord::pending(id, None)).await.unwrap();
                store.set(finished(id)).await.unwrap();
                id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert_eq!(store.len(), 32);
        for id in ids {
            assert_eq!(store.get(id).await.unwrap().status, Status::Finished);
        }
    }
}
