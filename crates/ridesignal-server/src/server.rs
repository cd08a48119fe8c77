use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use ridesignal_settings::{OverflowPolicy, SignalSettings};
use ridesignal_telemetry::MetricsRecorder;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::hub::Hub;
use crate::identity::IdentityValidator;
use crate::router::EventRouter;
use crate::socket;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_send_queue: usize,
    pub overflow_policy: OverflowPolicy,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&SignalSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &SignalSettings) -> Self {
        let server = &settings.server;
        let connections = &settings.connections;
        Self {
            host: server.host.clone(),
            port: server.port,
            ws_path: server.ws_path.clone(),
            allowed_origins: server.allowed_origins.clone(),
            max_send_queue: connections.send_queue_capacity,
            overflow_policy: connections.overflow_policy,
            heartbeat_interval: Duration::from_secs(connections.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(connections.client_timeout_secs),
            cleanup_interval: Duration::from_secs(connections.cleanup_interval_secs),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub heartbeat: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, ws_path: &str, cors: CorsLayer) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// CORS for the rider/driver web client. No origins configured means any.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ServerError> {
    if allowed_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).map_err(|_| ServerError::InvalidOrigin(o.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_credentials(true))
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
    validator: Arc<dyn IdentityValidator>,
) -> Result<ServerHandle, ServerError> {
    let cors = cors_layer(&config.allowed_origins)?;

    let hub = Arc::new(Hub::with_metrics(
        config.max_send_queue,
        config.overflow_policy,
        metrics,
    ));
    let router = Arc::new(EventRouter::new(Arc::clone(&hub)).with_validator(validator));

    let sweep = socket::start_liveness_sweep(
        Arc::clone(&hub),
        config.cleanup_interval,
        config.client_timeout,
    );

    let app = build_router(
        AppState {
            router,
            heartbeat: config.heartbeat_interval,
        },
        &config.ws_path,
        cors,
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: addr.clone(),
        source,
    })?;

    tracing::info!(
        addr = %local_addr,
        ws_path = %config.ws_path,
        policy = ?config.overflow_policy,
        "Signaling server started"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        shutdown: Some(shutdown_tx),
        server,
        sweep,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    hub: Arc<Hub>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl ServerHandle {
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Close every connection, stop accepting, and wait for the listener.
    pub async fn shutdown(mut self) {
        let closing = self.hub.connections.close_all();
        tracing::info!(connections = closing, "Shutting down");
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.sweep.abort();
        let _ = (&mut self.server).await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.sweep.abort();
        self.server.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    socket::handle_ws_connection(socket, state.router, state.heartbeat).await;
}

/// Liveness plus registry sizes and the metrics snapshot.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.router.hub();
    let stats = hub.stats();
    Json(serde_json::json!({
        "status": "healthy",
        "connections": stats.connections,
        "online": stats.online,
        "rooms": stats.rooms,
        "uptimeSecs": stats.uptime_secs,
        "metrics": hub.metrics().snapshot(),
    }))
}
