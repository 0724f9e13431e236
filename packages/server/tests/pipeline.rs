//! End-to-end pipeline tests: submit -> broker -> worker -> result -> query.
//!
//! A spawned task plays the remote worker pool against the in-memory
//! broker, mirroring the production deployment where workers consume the
//! request queue and publish onto the response queue.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use verity_core::{RequestId, Status, WireCodec};
use verity_server::bridge::{BridgeConfig, BridgeHandle, ComputeBridge, InMemoryBroker, MessageBroker};
use verity_server::engine::{
    ClientRequest, CorrelationEngine, EngineConfig, EngineHandle, EngineReply, SubmitDetection,
};
use verity_server::storage::MemoryStatusStore;

struct Pipeline {
    handle: EngineHandle,
    broker: Arc<InMemoryBroker>,
    // Held, not used: dropping the bridge handle would stop its tasks.
    _bridge: BridgeHandle,
}

fn start_pipeline(codec: WireCodec) -> Pipeline {
    let store = Arc::new(MemoryStatusStore::new());
    let (engine, channels) = CorrelationEngine::new(store, codec.clone(), EngineConfig::default());
    tokio::spawn(engine.run());

    let broker = Arc::new(InMemoryBroker::new());
    let config = BridgeConfig {
        poll_interval: Duration::from_millis(10),
        ..BridgeConfig::default()
    };
    let bridge = ComputeBridge::start(
        config,
        broker.clone(),
        codec,
        channels.outbound,
        channels.results,
    );

    Pipeline {
        handle: channels.handle,
        broker,
        _bridge: bridge,
    }
}

/// Plays the worker pool: consumes task frames and publishes FINISHED
/// results with an `ai-generated: 0.9` verdict.
fn spawn_fake_worker(broker: Arc<InMemoryBroker>) {
    tokio::spawn(async move {
        loop {
            let delivery = broker
                .fetch("requests", Duration::from_secs(30))
                .await
                .expect("in-memory fetch cannot fail");
            match delivery {
                Some(task) => {
                    let result = json!({
                        "request_id": task.payload["request_id"],
                        "status": "FINISHED",
                        "verdict": {
                            "labels": [{"label": "ai-generated", "probability": 0.9}],
                        },
                    });
                    broker
                        .publish("responses", &result)
                        .await
                        .expect("in-memory publish cannot fail");
                }
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    });
}

async fn submit(handle: &EngineHandle, content: &str) -> verity_core::StatusRecord {
    let reply = handle
        .send(ClientRequest::Submit(SubmitDetection {
            content: content.to_string(),
            detector_name: "ghostbuster".to_string(),
            owner: None,
        }))
        .await
        .expect("engine running")
        .await
        .expect("engine replies");
    match reply {
        EngineReply::Record(record) => record,
        EngineReply::Records(_) => panic!("submit must reply with a single record"),
    }
}

async fn query(handle: &EngineHandle, id: RequestId) -> verity_core::StatusRecord {
    let reply = handle
        .send(ClientRequest::Query(id))
        .await
        .expect("engine running")
        .await
        .expect("engine replies");
    match reply {
        EngineReply::Record(record) => record,
        EngineReply::Records(_) => panic!("query must reply with a single record"),
    }
}

/// Polls the status until it turns terminal or the deadline passes.
async fn await_terminal(handle: &EngineHandle, id: RequestId) -> verity_core::StatusRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let record = query(handle, id).await;
        if record.status.is_terminal() {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "request {id} never reached a terminal status (last: {})",
            record.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn hello_world_round_trip_finishes_with_a_verdict() {
    let pipeline = start_pipeline(WireCodec::default());
    spawn_fake_worker(pipeline.broker.clone());

    let pending = submit(&pipeline.handle, "hello world").await;
    assert_eq!(pending.status, Status::Pending);

    let finished = await_terminal(&pipeline.handle, pending.request_id).await;
    assert_eq!(finished.request_id, pending.request_id);
    assert_eq!(finished.status, Status::Finished);

    let verdict = finished.verdict.expect("finished records carry a verdict");
    assert_eq!(verdict.labels.len(), 1);
    assert_eq!(verdict.labels[0].label, "ai-generated");
    assert!((verdict.labels[0].probability - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn submission_stays_pending_without_a_worker() {
    let pipeline = start_pipeline(WireCodec::default());

    let pending = submit(&pipeline.handle, "anyone listening?").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The frame sits on the request queue; nobody consumed it and the
    // record is still PENDING.
    assert_eq!(pipeline.broker.depth("requests"), 1);
    let record = query(&pipeline.handle, pending.request_id).await;
    assert_eq!(record.status, Status::Pending);
}

#[tokio::test]
async fn unencodable_submission_fails_fast_and_reaches_no_queue() {
    let pipeline = start_pipeline(WireCodec::new(64));

    let record = submit(&pipeline.handle, &"x".repeat(4096)).await;
    assert_eq!(record.status, Status::ParsingFailed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.broker.depth("requests"), 0);

    let fetched = query(&pipeline.handle, record.request_id).await;
    assert_eq!(fetched.status, Status::ParsingFailed);
}

#[tokio::test]
async fn queries_for_foreign_ids_stay_unknown_end_to_end() {
    let pipeline = start_pipeline(WireCodec::default());
    spawn_fake_worker(pipeline.broker.clone());

    let record = query(&pipeline.handle, RequestId::mint()).await;
    assert_eq!(record.status, Status::Unknown);
}

#[tokio::test]
async fn malformed_worker_output_does_not_poison_the_pipeline() {
    let pipeline = start_pipeline(WireCodec::default());

    // A broken worker publishes junk, then a correct worker takes over.
    pipeline
        .broker
        .publish("responses", &json!({"wat": []}))
        .await
        .unwrap();
    spawn_fake_worker(pipeline.broker.clone());

    let pending = submit(&pipeline.handle, "resilient").await;
    let finished = await_terminal(&pipeline.handle, pending.request_id).await;
    assert_eq!(finished.status, Status::Finished);
}
