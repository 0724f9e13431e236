//! The correlation engine: one serialized loop bridging synchronous
//! callers and the asynchronous worker pool.
//!
//! The engine is the exclusive writer of the status store. It multiplexes
//! three event sources with no priority beyond first-ready-wins: client
//! envelopes from the front door, result records from the compute bridge,
//! and a periodic idle tick used only for liveness logging.
//!
//! Replies travel over single-use oneshot sinks. Sending to an abandoned
//! sink (the caller already timed out) is a debug-logged no-op, so a slow
//! or dead caller can never stall the loop.

pub mod config;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use verity_core::{DetectionRequest, OwnerId, RequestId, Status, StatusRecord, WireCodec};

use crate::storage::StatusStore;

pub use config::EngineConfig;

/// A detection submission before the engine has minted its id.
#[derive(Debug, Clone)]
pub struct SubmitDetection {
    pub content: String,
    pub detector_name: String,
    pub owner: Option<OwnerId>,
}

/// Client requests the engine accepts, one variant per front-door route.
///
/// An exhaustive enum: unknown message kinds are unrepresentable.
#[derive(Debug)]
pub enum ClientRequest {
    /// Accept a new work item; replies with the freshly written record.
    Submit(SubmitDetection),
    /// Read-through status lookup; replies immediately.
    Query(RequestId),
    /// Snapshot of all records, optionally filtered by owner.
    MassQuery(Option<OwnerId>),
}

/// What comes back over the envelope's reply sink.
#[derive(Debug)]
pub enum EngineReply {
    Record(StatusRecord),
    Records(Vec<StatusRecord>),
}

/// A client request paired with its single-use reply sink.
#[derive(Debug)]
pub struct ClientEnvelope {
    pub request: ClientRequest,
    pub reply: oneshot::Sender<EngineReply>,
}

/// A pre-encoded task frame queued for the bridge's outbound publisher.
///
/// Encoding happens in the submit path so an unencodable item fails the
/// submission synchronously and never reaches the broker.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub request_id: RequestId,
    pub payload: Value,
}

/// Error returned when the engine loop has stopped accepting envelopes.
#[derive(Debug, thiserror::Error)]
#[error("correlation engine is not running")]
pub struct EngineUnavailable;

/// Cloneable front-door handle for sending envelopes into the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    feed: mpsc::Sender<ClientEnvelope>,
}

impl EngineHandle {
    /// Sends a request into the engine and returns the receiver the reply
    /// will arrive on. The caller owns its wait (and its timeout).
    ///
    /// # Errors
    ///
    /// Returns [`EngineUnavailable`] when the engine loop has exited.
    pub async fn send(
        &self,
        request: ClientRequest,
    ) -> Result<oneshot::Receiver<EngineReply>, EngineUnavailable> {
        let (tx, rx) = oneshot::channel();
        self.feed
            .send(ClientEnvelope { request, reply: tx })
            .await
            .map_err(|_| EngineUnavailable)?;
        Ok(rx)
    }
}

/// Channel ends handed to the engine's collaborators at wiring time.
pub struct EngineChannels {
    /// Front-door handle.
    pub handle: EngineHandle,
    /// Result ingress used by the compute bridge (real and synthetic
    /// failure records both funnel through here, preserving the engine's
    /// single-writer property over the store).
    pub results: mpsc::Sender<StatusRecord>,
    /// Outbound frame egress consumed by the bridge's publisher.
    pub outbound: mpsc::Receiver<OutboundFrame>,
}

/// The serialized decision loop. Construct with [`CorrelationEngine::new`],
/// then spawn [`CorrelationEngine::run`].
pub struct CorrelationEngine {
    feed: mpsc::Receiver<ClientEnvelope>,
    results: mpsc::Receiver<StatusRecord>,
    outbound: mpsc::Sender<OutboundFrame>,
    store: Arc<dyn StatusStore>,
    codec: WireCodec,
    config: EngineConfig,
}

impl CorrelationEngine {
    /// Creates the engine and the channel ends its collaborators need.
    #[must_use]
    pub fn new(
        store: Arc<dyn StatusStore>,
        codec: WireCodec,
        config: EngineConfig,
    ) -> (Self, EngineChannels) {
        let (feed_tx, feed_rx) = mpsc::channel(config.feed_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (result_tx, result_rx) = mpsc::channel(config.result_capacity);

        let engine = Self {
            feed: feed_rx,
            results: result_rx,
            outbound: outbound_tx,
            store,
            codec,
            config,
        };
        let channels = EngineChannels {
            handle: EngineHandle { feed: feed_tx },
            results: result_tx,
            outbound: outbound_rx,
        };
        (engine, channels)
    }

    /// Runs the loop until both inbound channels have closed.
    pub async fn run(mut self) {
        let mut idle = tokio::time::interval(self.config.idle_period);
        idle.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                envelope = self.feed.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(envelope).await,
                    None => break,
                },
                // A closed result channel only silences this arm; the
                // engine keeps serving queries without a bridge.
                Some(record) = self.results.recv() => self.apply_result(record).await,
                _ = idle.tick() => debug!("engine idling"),
            }
        }
        debug!("engine loop stopped");
    }

    async fn handle_envelope(&mut self, envelope: ClientEnvelope) {
        debug!(request = ?envelope.request, "engine feed");
        let reply = match envelope.request {
            ClientRequest::Submit(submission) => {
                EngineReply::Record(self.submit(submission).await)
            }
            ClientRequest::Query(id) => EngineReply::Record(self.query(id).await),
            ClientRequest::MassQuery(owner) => {
                EngineReply::Records(self.mass_query(owner.as_ref()).await)
            }
        };
        respond(envelope.reply, reply);
    }

    /// Accepts a submission: mint the id, encode, persist `PENDING`, hand
    /// the frame to the bridge, and return the record for the synchronous
    /// reply. Never blocks on the remote worker.
    async fn submit(&mut self, submission: SubmitDetection) -> StatusRecord {
        let request_id = RequestId::mint();
        let item = DetectionRequest {
            request_id,
            content: submission.content,
            detector_name: submission.detector_name,
            owner: submission.owner,
        };
        metrics::counter!("verity_engine_submissions_total").increment(1);

        let record = match self.codec.encode_task(&item) {
            Ok(payload) => {
                let record = StatusRecord::pending(request_id, item.owner);
                self.put(record.clone()).await;
                match self.outbound.send(OutboundFrame { request_id, payload }).await {
                    Ok(()) => record,
                    Err(_) => {
                        // The bridge is gone; the item can never reach the
                        // worker pool.
                        warn!(%request_id, "outbound channel closed, failing submission");
                        let failed = StatusRecord {
                            owner: item.owner,
                            ..StatusRecord::bare(request_id, Status::TransportFailed)
                        };
                        self.put(failed.clone()).await;
                        failed
                    }
                }
            }
            Err(err) => {
                warn!(%request_id, error = %err, "task frame encoding failed");
                metrics::counter!("verity_engine_encode_failures_total").increment(1);
                let failed = StatusRecord {
                    owner: item.owner,
                    ..StatusRecord::bare(request_id, Status::ParsingFailed)
                };
                self.put(failed.clone()).await;
                failed
            }
        };
        record
    }

    async fn query(&self, id: RequestId) -> StatusRecord {
        match self.store.get(id).await {
            Ok(record) => record,
            Err(err) => {
                // Degrade reads rather than surfacing storage trouble to
                // callers; the loop must keep running.
                error!(request_id = %id, error = %err, "status read failed");
                StatusRecord::unknown(id)
            }
        }
    }

    async fn mass_query(&self, owner: Option<&OwnerId>) -> Vec<StatusRecord> {
        match self.store.mass(owner).await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "mass status read failed");
                Vec::new()
            }
        }
    }

    /// Applies a result from the bridge: unconditional overwrite, no
    /// transition validation. Result frames never carry an owner, so the
    /// owner recorded at submission is preserved.
    async fn apply_result(&mut self, mut record: StatusRecord) {
        debug!(request_id = %record.request_id, status = %record.status, "result feed");
        metrics::counter!("verity_engine_results_total").increment(1);

        if record.owner.is_none() {
            if let Ok(existing) = self.store.get(record.request_id).await {
                record.owner = existing.owner;
            }
        }
        self.put(record).await;
    }

    async fn put(&self, record: StatusRecord) {
        if let Err(err) = self.store.set(record).await {
            error!(error = %err, "status write failed");
        }
    }
}

/// Delivers a reply exactly once, discarding silently when the caller has
/// abandoned its sink.
fn respond(reply: oneshot::Sender<EngineReply>, value: EngineReply) {
    if reply.send(value).is_err() {
        debug!("caller abandoned its reply sink, discarding reply");
    }
}
