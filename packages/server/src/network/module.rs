//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the composition root to wire the
//! engine and bridge between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::config::NetworkConfig;
use super::handlers::{self, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::engine::EngineHandle;
use crate::storage::DetectorCatalog;

/// OpenAPI document covering the detection API and health probes.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Verity Detection API",
        description = "Submit content for asynchronous AI-text detection and poll for verdicts."
    ),
    paths(
        handlers::detection::put_detection,
        handlers::detection::get_detection,
        handlers::detection::get_mass_detection,
        handlers::detection::get_detectors,
        handlers::health::health_handler,
        handlers::health::liveness_handler,
        handlers::health::readiness_handler,
    ),
    components(schemas(
        handlers::detection::SubmitDetectionBody,
        handlers::detection::DetectionStatusResponse,
        handlers::detection::VerdictResponse,
        handlers::detection::LabelResponse,
        handlers::detection::DetectorsResponse,
        handlers::detection::ErrorResponse,
    ))
)]
struct ApiDoc;

/// Manages the HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    engine: EngineHandle,
    detectors: Arc<dyn DetectorCatalog>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        engine: EngineHandle,
        detectors: Arc<dyn DetectorCatalog>,
    ) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            engine,
            detectors,
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes, middleware, and the
    /// Swagger UI.
    ///
    /// Routes:
    /// - `PUT /api/v1/detection` -- submit a work item
    /// - `GET /api/v1/detection` -- status query by `requestId`
    /// - `GET /api/v1/detection/mass` -- all records, optional `userId` filter
    /// - `GET /api/v1/detectors` -- available detector names
    /// - `GET /health`, `/health/live`, `/health/ready` -- probes
    /// - `/swagger-ui`, `/api-docs/openapi.json` -- API documentation
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            detectors: Arc::clone(&self.detectors),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(&self.config);

        Router::new()
            .route(
                "/api/v1/detection",
                put(handlers::put_detection).get(handlers::get_detection),
            )
            .route("/api/v1/detection/mass", get(handlers::get_mass_detection))
            .route("/api/v1/detectors", get(handlers::get_detectors))
            .route("/health", get(handlers::health_handler))
            .route("/health/live", get(handlers::liveness_handler))
            .route("/health/ready", get(handlers::readiness_handler))
            .layer(layers)
            .with_state(state)
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires, then
    /// drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let shutdown_ctrl = self.shutdown;

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();
        info!("serving HTTP connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        shutdown_ctrl.trigger_shutdown();
        let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
        if drained {
            info!("all in-flight requests drained");
        } else {
            warn!("drain timeout expired with in-flight requests remaining");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use verity_core::WireCodec;

    use super::*;
    use crate::engine::{CorrelationEngine, EngineConfig};
    use crate::storage::{MemoryStatusStore, StaticDetectorCatalog, StorageConfig};

    fn test_module(port: u16) -> NetworkModule {
        let store = Arc::new(MemoryStatusStore::new());
        let (engine, channels) =
            CorrelationEngine::new(store, WireCodec::default(), EngineConfig::default());
        tokio::spawn(engine.run());
        // The bridge ends are irrelevant to lifecycle tests; leak them so
        // submissions would still enqueue.
        std::mem::forget(channels.outbound);
        std::mem::forget(channels.results);

        let config = NetworkConfig {
            port,
            ..NetworkConfig::default()
        };
        let detectors = Arc::new(StaticDetectorCatalog::new(StorageConfig::default().detectors));
        NetworkModule::new(config, channels.handle, detectors)
    }

    #[tokio::test]
    async fn new_creates_module_without_binding() {
        let module = test_module(0);
        assert!(module.listener.is_none());
    }

    #[tokio::test]
    async fn shutdown_controller_returns_shared_arc() {
        let module = test_module(0);
        let s1 = module.shutdown_controller();
        let s2 = module.shutdown_controller();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[tokio::test]
    async fn build_router_creates_router() {
        let module = test_module(0);
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = test_module(0);
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = test_module(0);
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
