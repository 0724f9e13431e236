//! Verity server binary: the single composition root.
//!
//! Wires Store -> Engine -> Bridge -> Front Door in one canonical order.
//! Unreachable storage or broker at boot is fatal; once the listener is
//! accepting traffic, all failures degrade per-request instead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use verity_core::WireCodec;
use verity_server::bridge::{
    BridgeConfig, BrokerBackend, ComputeBridge, InMemoryBroker, MessageBroker,
};
use verity_server::engine::{CorrelationEngine, EngineConfig};
use verity_server::network::{NetworkConfig, NetworkModule};
use verity_server::storage::{
    config::default_detectors, DetectorCatalog, MemoryStatusStore, StaticDetectorCatalog,
    StatusStore, StorageBackend,
};

#[derive(Parser, Debug)]
#[command(
    name = "verity-server",
    version,
    about = "Asynchronous AI-text detection gateway"
)]
struct Args {
    /// Bind address for the HTTP listener.
    #[arg(long, env = "VERITY_HTTP_HOST", default_value = "0.0.0.0")]
    http_host: String,

    /// Port for the HTTP listener.
    #[arg(long, env = "VERITY_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Status store backend: memory | postgres.
    #[arg(long, env = "VERITY_STORAGE_BACKEND", default_value = "memory")]
    storage_backend: StorageBackend,

    /// Broker backend: memory | pgmq.
    #[arg(long, env = "VERITY_BROKER_BACKEND", default_value = "memory")]
    broker_backend: BrokerBackend,

    /// Postgres URL for the status store.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Postgres URL for the pgmq broker. Falls back to --database-url.
    #[arg(long, env = "VERITY_BROKER_URL")]
    broker_url: Option<String>,

    /// Queue carrying task frames to the worker pool.
    #[arg(long, env = "VERITY_REQUEST_QUEUE", default_value = "requests")]
    request_queue: String,

    /// Queue carrying result frames back.
    #[arg(long, env = "VERITY_RESPONSE_QUEUE", default_value = "responses")]
    response_queue: String,

    /// Detector names for the static catalog (memory backend only).
    #[arg(long, env = "VERITY_DETECTORS", value_delimiter = ',', default_values_t = default_detectors())]
    detectors: Vec<String>,

    /// How long a handler waits for the engine's reply, in seconds.
    #[arg(long, env = "VERITY_REPLY_TIMEOUT_SECS", default_value_t = 5)]
    reply_timeout_secs: u64,

    /// Log output format: pretty | json.
    #[arg(long, env = "VERITY_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Bind address for the Prometheus exporter; disabled when absent.
    #[arg(long, env = "VERITY_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_format);
    info!(?args, "starting verity-server");

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start the prometheus exporter")?;
        info!(%addr, "prometheus exporter listening");
    }

    let (store, detectors) = build_storage(&args).await?;

    let bridge_config = BridgeConfig {
        backend: args.broker_backend,
        broker_url: args.broker_url.clone(),
        request_queue: args.request_queue.clone(),
        response_queue: args.response_queue.clone(),
        ..BridgeConfig::default()
    };
    let codec = WireCodec::new(bridge_config.max_frame_bytes);
    let broker = build_broker(&args, &bridge_config).await?;

    let (engine, channels) = CorrelationEngine::new(store, codec.clone(), EngineConfig::default());
    tokio::spawn(engine.run());

    let bridge = ComputeBridge::start(
        bridge_config,
        broker,
        codec,
        channels.outbound,
        channels.results,
    );

    let network_config = NetworkConfig {
        host: args.http_host.clone(),
        port: args.http_port,
        reply_timeout: Duration::from_secs(args.reply_timeout_secs),
        ..NetworkConfig::default()
    };
    let mut network = NetworkModule::new(network_config, channels.handle, detectors);
    network.start().await.context("failed to bind the listener")?;

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    bridge.stop().await;
    info!("verity-server stopped");
    Ok(())
}

/// Builds the status store and detector catalog for the selected backend.
///
/// Postgres construction is fail-fast: an unreachable database must stop
/// the boot before the listener accepts traffic.
async fn build_storage(
    args: &Args,
) -> anyhow::Result<(Arc<dyn StatusStore>, Arc<dyn DetectorCatalog>)> {
    match args.storage_backend {
        StorageBackend::Memory => Ok((
            Arc::new(MemoryStatusStore::new()) as Arc<dyn StatusStore>,
            Arc::new(StaticDetectorCatalog::new(args.detectors.clone())) as Arc<dyn DetectorCatalog>,
        )),
        StorageBackend::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let url = args
                    .database_url
                    .as_deref()
                    .context("--database-url is required for the postgres backend")?;
                let store = verity_server::storage::PostgresStore::connect(url)
                    .await
                    .context("failed to connect to the status database")?;
                store.migrate().await.context("schema migration failed")?;
                let store = Arc::new(store);
                Ok((
                    Arc::clone(&store) as Arc<dyn StatusStore>,
                    store as Arc<dyn DetectorCatalog>,
                ))
            }
            #[cfg(not(feature = "postgres"))]
            {
                anyhow::bail!("this build does not include the postgres feature")
            }
        }
    }
}

/// Builds the broker for the selected transport, ensuring both queues
/// exist before any traffic is accepted.
async fn build_broker(
    args: &Args,
    config: &BridgeConfig,
) -> anyhow::Result<Arc<dyn MessageBroker>> {
    match config.backend {
        BrokerBackend::Memory => {
            info!("using the in-memory loopback broker; no external worker pool is attached");
            Ok(Arc::new(InMemoryBroker::new()) as Arc<dyn MessageBroker>)
        }
        BrokerBackend::Pgmq => {
            #[cfg(feature = "postgres")]
            {
                let url = config
                    .broker_url
                    .as_deref()
                    .or(args.database_url.as_deref())
                    .context("--broker-url or --database-url is required for the pgmq backend")?;
                let broker = verity_server::bridge::PgmqBroker::connect(url)
                    .await
                    .context("failed to connect to the broker database")?;
                broker
                    .ensure_queue(&config.request_queue)
                    .await
                    .context("failed to create the request queue")?;
                broker
                    .ensure_queue(&config.response_queue)
                    .await
                    .context("failed to create the response queue")?;
                Ok(Arc::new(broker) as Arc<dyn MessageBroker>)
            }
            #[cfg(not(feature = "postgres"))]
            {
                let _ = args;
                anyhow::bail!("this build does not include the postgres feature")
            }
        }
    }
}

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
