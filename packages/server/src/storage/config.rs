//! Storage configuration: backend selection and the detector list.

use std::str::FromStr;

/// Which status-store backend to wire at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// DashMap-backed, process-local. Development and tests.
    Memory,
    /// sqlx/Postgres. Requires the `postgres` feature and a database URL.
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// Connection URL for the Postgres backend.
    pub database_url: Option<String>,
    /// Detector names for the static catalog. The Postgres backend reads
    /// the catalog from the `detectors` table instead.
    pub detectors: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            detectors: default_detectors(),
        }
    }
}

/// The detector set shipped by the worker pool images.
#[must_use]
pub fn default_detectors() -> Vec<String> {
    ["ghostbuster", "perplexity", "roberta", "detect-gpt"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
