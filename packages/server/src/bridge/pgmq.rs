//! pgmq-backed [`MessageBroker`] via direct sqlx calls.
//!
//! Uses the Postgres `pgmq` extension's SQL functions: `pgmq.create`,
//! `pgmq.send`, `pgmq.read`, `pgmq.delete`. Queue creation is idempotent
//! and runs at boot; an unreachable database at that point is fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::broker::{BrokerError, BrokerMessage, MessageBroker};

/// Broker speaking pgmq over a sqlx pool.
#[derive(Debug, Clone)]
pub struct PgmqBroker {
    pool: PgPool,
}

impl PgmqBroker {
    /// Connects to the database hosting the queues.
    ///
    /// # Errors
    ///
    /// Returns the underlying sqlx error when the database is unreachable.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool, sharing connections with the status store
    /// when both live on the same database.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a queue if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the underlying sqlx error; missing `pgmq` extension shows
    /// up here at boot rather than on the first publish.
    pub async fn ensure_queue(&self, queue: &str) -> Result<(), BrokerError> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for PgmqBroker {
    async fn publish(&self, queue: &str, payload: &Value) -> Result<(), BrokerError> {
        sqlx::query("SELECT pgmq.send($1, $2, $3)")
            .bind(queue)
            .bind(payload)
            .bind(0_i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<BrokerMessage>, BrokerError> {
        let vt = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let row: Option<(i64, Value)> =
            sqlx::query_as("SELECT msg_id, message FROM pgmq.read($1, $2, 1)")
                .bind(queue)
                .bind(vt)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, payload)| BrokerMessage { id, payload }))
    }

    async fn ack(&self, queue: &str, message_id: i64) -> Result<(), BrokerError> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue)
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
