//! HTTP handler definitions for the front door.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod detection;
pub mod health;

pub use detection::{get_detection, get_detectors, get_mass_detection, put_detection};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::engine::EngineHandle;
use crate::storage::DetectorCatalog;

use super::{NetworkConfig, ShutdownController};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Front-door handle into the correlation engine.
    pub engine: EngineHandle,
    /// Catalog used to validate `detector_name` and serve `/detectors`.
    pub detectors: Arc<dyn DetectorCatalog>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, timeouts).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
