//! Process-local [`MessageBroker`] for development and tests.
//!
//! Named FIFO queues in a shared map. `fetch` pops immediately, so `ack`
//! is a no-op; there is no redelivery. This mirrors the loopback broker
//! the worker pool ships for single-process setups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::broker::{BrokerError, BrokerMessage, MessageBroker};

/// In-memory named queues behind the [`MessageBroker`] contract.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, VecDeque<Value>>,
    next_id: AtomicI64,
}

impl InMemoryBroker {
    /// Creates a broker with no queues; queues appear on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of undelivered messages on the named queue.
    #[must_use]
    pub fn depth(&self, queue: &str) -> usize {
        self.queues.get(queue).map_or(0, |q| q.len())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &Value) -> Result<(), BrokerError> {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.clone());
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        _visibility_timeout: Duration,
    ) -> Result<Option<BrokerMessage>, BrokerError> {
        let popped = self
            .queues
            .get_mut(queue)
            .and_then(|mut q| q.pop_front());
        Ok(popped.map(|payload| BrokerMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            payload,
        }))
    }

    async fn ack(&self, _queue: &str, _message_id: i64) -> Result<(), BrokerError> {
        Ok(())
    }
}
