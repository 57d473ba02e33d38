//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::RelayError;
use crate::health;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::relay::{RelayHandle, spawn_engine};
use crate::shutdown::{DRAIN_TIMEOUT, ShutdownCoordinator};
use crate::websocket::connection::ConnectionId;
use crate::websocket::session::{SessionLimits, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay engine front door.
    pub relay: RelayHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started (monotonic).
    pub start_time: Instant,
    /// When the server started (wall clock).
    pub started_at: DateTime<Utc>,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The pose relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: RelayHandle,
    engine: JoinHandle<()>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    started_at: DateTime<Utc>,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server and spawn its relay engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (relay, engine) = spawn_engine(config.relay, shutdown.token());
        Self {
            config: Arc::new(config),
            relay,
            engine,
            shutdown,
            start_time: Instant::now(),
            started_at: Utc::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            started_at: self.started_at,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Get the relay handle.
    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and start serving.
    ///
    /// Fails with [`RelayError::Bind`] if the address is unavailable; no
    /// client is ever accepted in that case.
    pub async fn listen(self) -> Result<RunningServer, RelayError> {
        let addr = self.config.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(source) => {
                self.shutdown.shutdown();
                return Err(RelayError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            mode = ?self.config.relay.mode,
            echo = ?self.config.relay.echo,
            max_connections = self.config.max_connections,
            "pose relay listening"
        );

        let router = self.router();
        let signal = self.shutdown.token().cancelled_owned();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
        });

        Ok(RunningServer {
            addr: local_addr,
            relay: self.relay,
            shutdown: self.shutdown,
            server,
            engine: self.engine,
        })
    }
}

/// A bound, serving relay. Dropping it leaves the tasks running; call
/// [`RunningServer::stop`] to end them.
pub struct RunningServer {
    addr: SocketAddr,
    relay: RelayHandle,
    shutdown: Arc<ShutdownCoordinator>,
    server: JoinHandle<()>,
    engine: JoinHandle<()>,
}

impl RunningServer {
    /// Actual bound address (useful with port `0`).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the relay handle.
    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Stop accepting, close every session, stop the engine and wait.
    pub async fn stop(self) {
        let aborted = self
            .shutdown
            .drain(vec![self.server, self.engine], DRAIN_TIMEOUT)
            .await;
        info!(aborted, "pose relay stopped");
    }
}

/// GET `/` and `/ws`: WebSocket upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Ok(stats) = state.relay.stats().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "relay is shutting down").into_response();
    };
    if stats.connections >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            connections = stats.connections,
            max = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let conn_id = ConnectionId::new();
    let limits = SessionLimits::from(state.config.as_ref());
    let cancel = state.shutdown.token();
    let relay = state.relay;
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_ws_session(socket, conn_id, relay, limits, cancel))
}

/// GET `/health`
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.relay.stats().await {
        Ok(stats) => Json(health::health_check(state.start_time, state.started_at, &stats)).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// GET `/metrics`
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => crate::metrics::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
