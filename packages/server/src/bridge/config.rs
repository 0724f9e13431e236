//! Compute bridge configuration.

use std::str::FromStr;
use std::time::Duration;

use verity_core::messages::DEFAULT_MAX_FRAME_BYTES;

/// Which broker transport to wire at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerBackend {
    /// Process-local loopback queues. Development and tests.
    Memory,
    /// Postgres pgmq. Requires the `postgres` feature and a database URL.
    Pgmq,
}

impl FromStr for BrokerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "pgmq" => Ok(Self::Pgmq),
            other => Err(format!("unknown broker backend: {other}")),
        }
    }
}

/// Queue names and polling cadence for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Selected transport.
    pub backend: BrokerBackend,
    /// Connection URL for the pgmq backend.
    pub broker_url: Option<String>,
    /// Queue carrying task frames to the worker pool.
    pub request_queue: String,
    /// Queue carrying result frames back.
    pub response_queue: String,
    /// How often the inbound consumer polls the response queue.
    pub poll_interval: Duration,
    /// How long a fetched-but-unacked delivery stays invisible.
    pub visibility_timeout: Duration,
    /// Interval between idle liveness logs.
    pub idle_period: Duration,
    /// Cap on an encoded task frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::Memory,
            broker_url: None,
            request_queue: "requests".to_string(),
            response_queue: "responses".to_string(),
            poll_interval: Duration::from_millis(250),
            visibility_timeout: Duration::from_secs(30),
            idle_period: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}
