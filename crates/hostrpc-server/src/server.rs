//! `HostRpcServer`: Axum HTTP + WebSocket front of one RPC session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use hostrpc_auth::DigestAuthenticator;
use hostrpc_rpc::RpcSession;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::session::{SessionActor, SessionInbox, SessionQueue, SessionStats};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session queue every socket posts into.
    pub queue: SessionQueue,
    /// Counters published by the session.
    pub stats: Arc<SessionStats>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Digest authenticator; `None` admits every upgrade.
    pub auth: Option<Arc<DigestAuthenticator>>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
    /// Cancelled on shutdown.
    pub shutdown: CancellationToken,
}

/// The host RPC server.
pub struct HostRpcServer {
    config: Arc<ServerConfig>,
    queue: SessionQueue,
    stats: Arc<SessionStats>,
    actor: Mutex<Option<SessionActor>>,
    auth: Option<Arc<DigestAuthenticator>>,
    metrics: PrometheusHandle,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl HostRpcServer {
    /// Create a server around `session`.
    ///
    /// `queue` and `inbox` must be the pair whose change sink was handed to
    /// the registry builder, so host pushes reach this session.
    pub fn new(
        config: ServerConfig,
        session: RpcSession,
        queue: SessionQueue,
        inbox: SessionInbox,
        metrics: PrometheusHandle,
    ) -> Self {
        let stats = Arc::new(SessionStats::default());
        let actor = SessionActor::new(
            session,
            queue.clone(),
            inbox,
            config.replay_delay,
            stats.clone(),
        );
        Self {
            config: Arc::new(config),
            queue,
            stats,
            actor: Mutex::new(Some(actor)),
            auth: None,
            metrics,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Require the digest handshake on every upgrade.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<DigestAuthenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            queue: self.queue.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
            auth: self.auth.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            shutdown: self.shutdown.token(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(ws_handler)
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the session task and serve until shutdown.
    ///
    /// The returned handle completes once the accept loop and the session
    /// task have both stopped.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let actor = self
            .actor
            .lock()
            .take()
            .ok_or_else(|| std::io::Error::other("server is already listening"))?;

        let token = self.shutdown.token();
        let session = tokio::spawn(actor.run(token.clone()));
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(err) = serve.await {
                error!(error = %err, "server error");
            }
            if let Err(err) = session.await {
                error!(error = %err, "session task failed");
            }
        });

        info!(%addr, auth = self.auth.is_some(), "server listening");
        Ok((addr, handle))
    }

    /// Session queue, for embedders that post events directly.
    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    /// Session counters.
    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
