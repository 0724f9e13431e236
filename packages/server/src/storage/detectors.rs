//! Detector catalog: which processing variants the worker pool offers.
//!
//! The front door validates `detector_name` against the catalog before a
//! submission ever reaches the engine, and `/detectors` exposes the list.

use async_trait::async_trait;

use super::status_store::StorageError;

/// Read-only catalog of available detector names.
#[async_trait]
pub trait DetectorCatalog: Send + Sync + 'static {
    /// All known detector names.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Whether a detector with this name exists.
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;
}

/// Catalog backed by a fixed, configured name list.
#[derive(Debug, Clone)]
pub struct StaticDetectorCatalog {
    names: Vec<String>,
}

impl StaticDetectorCatalog {
    /// Creates a catalog from the given names.
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl DetectorCatalog for StaticDetectorCatalog {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.names.clone())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.names.iter().any(|n| n == name))
    }
}
