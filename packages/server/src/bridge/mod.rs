//! The compute bridge: bidirectional adapter between the engine and the
//! broker the worker pool listens on.
//!
//! Two independent, concurrently active duties:
//!
//! - **Outbound** publishes pre-encoded task frames onto the request
//!   queue. A failed publish synthesizes a `TRANSPORT_FAILED` record and
//!   feeds it back through the engine's result channel -- the bridge never
//!   writes the store directly and never drops a failure silently.
//! - **Inbound** polls the response queue, decodes result frames, and
//!   forwards them to the engine. Malformed deliveries are logged, acked,
//!   and dropped: a deliberate best-effort boundary with no retry and no
//!   dead-letter queue.
//!
//! The two flows are unordered relative to each other and to the engine
//! loop except through the channels connecting them.

pub mod broker;
pub mod config;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod pgmq;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use verity_core::{Status, StatusRecord, WireCodec};

use crate::engine::OutboundFrame;

pub use broker::{BrokerError, BrokerMessage, MessageBroker};
pub use config::{BridgeConfig, BrokerBackend};
pub use memory::InMemoryBroker;
#[cfg(feature = "postgres")]
pub use pgmq::PgmqBroker;

/// Handle to the bridge's two running tasks.
pub struct BridgeHandle {
    shutdown: watch::Sender<bool>,
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl BridgeHandle {
    /// Signals both tasks to stop and waits for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.outbound.await;
        let _ = self.inbound.await;
    }
}

/// Starts the outbound publisher and inbound consumer tasks.
pub struct ComputeBridge;

impl ComputeBridge {
    /// Spawns both bridge tasks and returns their handle.
    ///
    /// `outbound` is the engine's frame egress; `results` is the engine's
    /// result ingress, shared with the worker-facing inbound flow so
    /// synthetic failures take the same path as real results.
    #[must_use]
    pub fn start(
        config: BridgeConfig,
        broker: Arc<dyn MessageBroker>,
        codec: WireCodec,
        outbound: mpsc::Receiver<OutboundFrame>,
        results: mpsc::Sender<StatusRecord>,
    ) -> BridgeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let outbound_task = tokio::spawn(run_outbound(
            config.clone(),
            Arc::clone(&broker),
            outbound,
            results.clone(),
            shutdown_rx.clone(),
        ));
        let inbound_task = tokio::spawn(run_inbound(config, broker, codec, results, shutdown_rx));

        BridgeHandle {
            shutdown: shutdown_tx,
            outbound: outbound_task,
            inbound: inbound_task,
        }
    }
}

async fn run_outbound(
    config: BridgeConfig,
    broker: Arc<dyn MessageBroker>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    results: mpsc::Sender<StatusRecord>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut idle = tokio::time::interval(config.idle_period);
    idle.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    debug!(request_id = %frame.request_id, "publishing task frame");
                    match broker.publish(&config.request_queue, &frame.payload).await {
                        Ok(()) => {
                            metrics::counter!("verity_bridge_published_total").increment(1);
                        }
                        Err(err) => {
                            warn!(
                                request_id = %frame.request_id,
                                error = %err,
                                "publish failed, synthesizing TRANSPORT_FAILED"
                            );
                            metrics::counter!("verity_bridge_publish_failures_total").increment(1);
                            let record =
                                StatusRecord::bare(frame.request_id, Status::TransportFailed);
                            if results.send(record).await.is_err() {
                                // Engine gone; nothing left to report to.
                                break;
                            }
                        }
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
            _ = idle.tick() => debug!("bridge outbound idling"),
        }
    }
    debug!("bridge outbound stopped");
}

async fn run_inbound(
    config: BridgeConfig,
    broker: Arc<dyn MessageBroker>,
    codec: WireCodec,
    results: mpsc::Sender<StatusRecord>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut poll = tokio::time::interval(config.poll_interval);
    let mut idle = tokio::time::interval(config.idle_period);
    idle.tick().await;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if drain_responses(&config, broker.as_ref(), &codec, &results).await {
                    break;
                }
            }
            _ = shutdown.changed() => break,
            _ = idle.tick() => debug!("bridge inbound idling"),
        }
    }
    debug!("bridge inbound stopped");
}

/// Consumes everything currently available on the response queue.
///
/// Returns true when the engine's result channel has closed and the
/// consumer should stop.
async fn drain_responses(
    config: &BridgeConfig,
    broker: &dyn MessageBroker,
    codec: &WireCodec,
    results: &mpsc::Sender<StatusRecord>,
) -> bool {
    loop {
        let delivery = match broker
            .fetch(&config.response_queue, config.visibility_timeout)
            .await
        {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return false,
            Err(err) => {
                // Transient transport trouble; the next poll retries.
                warn!(error = %err, "response fetch failed");
                return false;
            }
        };

        match codec.decode_result(&delivery.payload) {
            Ok(record) => {
                debug!(request_id = %record.request_id, status = %record.status, "result frame");
                if results.send(record).await.is_err() {
                    return true;
                }
            }
            Err(err) => {
                // Best-effort boundary: malformed deliveries are dropped,
                // not retried or dead-lettered.
                warn!(error = %err, "dropping undecodable result frame");
                metrics::counter!("verity_bridge_decode_failures_total").increment(1);
            }
        }

        if let Err(err) = broker.ack(&config.response_queue, delivery.id).await {
            warn!(message_id = delivery.id, error = %err, "failed to ack delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use verity_core::RequestId;

    use super::*;

    /// Broker whose publishes always fail, for transport-failure paths.
    struct FailingBroker;

    #[async_trait]
    impl MessageBroker for FailingBroker {
        async fn publish(&self, _queue: &str, _payload: &Value) -> Result<(), BrokerError> {
            Err(BrokerError::Unavailable("wire cut".to_string()))
        }

        async fn fetch(
            &self,
            _queue: &str,
            _visibility_timeout: Duration,
        ) -> Result<Option<BrokerMessage>, BrokerError> {
            Ok(None)
        }

        async fn ack(&self, _queue: &str, _message_id: i64) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_millis(10),
            ..BridgeConfig::default()
        }
    }

    fn channels() -> (
        mpsc::Sender<OutboundFrame>,
        mpsc::Receiver<OutboundFrame>,
        mpsc::Sender<StatusRecord>,
        mpsc::Receiver<StatusRecord>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (res_tx, res_rx) = mpsc::channel(16);
        (out_tx, out_rx, res_tx, res_rx)
    }

    #[tokio::test]
    async fn outbound_frames_land_on_the_request_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let (out_tx, out_rx, res_tx, _res_rx) = channels();
        let handle = ComputeBridge::start(
            fast_config(),
            broker.clone(),
            WireCodec::default(),
            out_rx,
            res_tx,
        );

        out_tx
            .send(OutboundFrame {
                request_id: RequestId::mint(),
                payload: json!({"content": "hello"}),
            })
            .await
            .unwrap();

        // Give the publisher a moment to run.
        for _ in 0..50 {
            if broker.depth("requests") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.depth("requests"), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn failed_publish_synthesizes_transport_failed_with_the_id() {
        let (out_tx, out_rx, res_tx, mut res_rx) = channels();
        let handle = ComputeBridge::start(
            fast_config(),
            Arc::new(FailingBroker),
            WireCodec::default(),
            out_rx,
            res_tx,
        );

        let id = RequestId::mint();
        out_tx
            .send(OutboundFrame {
                request_id: id,
                payload: json!({}),
            })
            .await
            .unwrap();

        let record = tokio::time::timeout(Duration::from_secs(2), res_rx.recv())
            .await
            .expect("synthetic failure must arrive")
            .unwrap();
        assert_eq!(record.request_id, id);
        assert_eq!(record.status, Status::TransportFailed);

        handle.stop().await;
    }

    #[tokio::test]
    async fn inbound_results_are_decoded_and_forwarded() {
        let broker = Arc::new(InMemoryBroker::new());
        let id = RequestId::mint();
        broker
            .publish(
                "responses",
                &json!({
                    "request_id": id.to_string(),
                    "status": "FINISHED",
                    "verdict": {"labels": [{"label": "ai-generated", "probability": 0.9}]},
                }),
            )
            .await
            .unwrap();

        let (_out_tx, out_rx, res_tx, mut res_rx) = channels();
        let handle =
            ComputeBridge::start(fast_config(), broker, WireCodec::default(), out_rx, res_tx);

        let record = tokio::time::timeout(Duration::from_secs(2), res_rx.recv())
            .await
            .expect("decoded result must arrive")
            .unwrap();
        assert_eq!(record.request_id, id);
        assert_eq!(record.status, Status::Finished);

        handle.stop().await;
    }

    #[tokio::test]
    async fn malformed_inbound_deliveries_are_dropped_not_forwarded() {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .publish("responses", &json!({"garbage": true}))
            .await
            .unwrap();
        let id = RequestId::mint();
        broker
            .publish(
                "responses",
                &json!({"request_id": id.to_string(), "status": "FAILED"}),
            )
            .await
            .unwrap();

        let (_out_tx, out_rx, res_tx, mut res_rx) = channels();
        let handle = ComputeBridge::start(
            fast_config(),
            broker.clone(),
            WireCodec::default(),
            out_rx,
            res_tx,
        );

        // Only the well-formed frame comes through.
        let record = tokio::time::timeout(Duration::from_secs(2), res_rx.recv())
            .await
            .expect("valid result must arrive")
            .unwrap();
        assert_eq!(record.request_id, id);
        assert_eq!(record.status, Status::Failed);
        assert_eq!(broker.depth("responses"), 0);

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_terminates_both_tasks() {
        let (out_tx, out_rx, res_tx, _res_rx) = channels();
        let handle = ComputeBridge::start(
            fast_config(),
            Arc::new(InMemoryBroker::new()),
            WireCodec::default(),
            out_rx,
            res_tx,
        );

        handle.stop().await;
        // The outbound receiver is gone once the task has exited.
        assert!(out_tx
            .send(OutboundFrame {
                request_id: RequestId::mint(),
                payload: json!({}),
            })
            .await
            .is_err());
    }
}
