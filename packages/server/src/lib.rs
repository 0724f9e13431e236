//! Verity Server — HTTP front door, correlation engine, compute bridge,
//! and status storage for asynchronous AI-text detection.

pub mod bridge;
pub mod engine;
pub mod network;
pub mod storage;

pub use bridge::{BridgeConfig, ComputeBridge, MessageBroker};
pub use engine::{CorrelationEngine, EngineConfig, EngineHandle};
pub use network::{NetworkConfig, NetworkModule};
pub use storage::{DetectorCatalog, StatusStore, StorageConfig};
