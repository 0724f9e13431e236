//! The [`MessageBroker`] seam between the bridge and the outside world.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Errors from broker transport operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[cfg(feature = "postgres")]
    #[error("broker database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// One delivery read from a queue.
///
/// The message stays invisible to other consumers until acknowledged or
/// its visibility timeout lapses.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub id: i64,
    pub payload: Value,
}

/// Minimal two-queue broker surface the bridge needs.
///
/// The broker gives no ordering or pairing guarantees between the request
/// and response queues; correlation rests entirely on request ids inside
/// the payloads.
#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    /// Publishes a JSON payload onto the named queue.
    async fn publish(&self, queue: &str, payload: &Value) -> Result<(), BrokerError>;

    /// Reads the next delivery from the named queue, if any.
    async fn fetch(
        &self,
        queue: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<BrokerMessage>, BrokerError>;

    /// Acknowledges (permanently removes) a delivery.
    async fn ack(&self, queue: &str, message_id: i64) -> Result<(), BrokerError>;
}
