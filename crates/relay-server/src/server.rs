use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use relay_telemetry::MetricsRecorder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{PushConfig, ServerConfig};
use crate::connection::{self, ConnectionSettings};
use crate::error::ServerError;
use crate::hub::{RelayHandle, RelayHub};
use crate::push::{self, PushSource, PushState};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub metrics: Arc<MetricsRecorder>,
    pub settings: ConnectionSettings,
    pub max_message_size: usize,
}

/// Build the chat router: WebSocket at `/`, plus health and metrics.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the chat relay server. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, metrics: Arc<MetricsRecorder>) -> Result<ServerHandle, ServerError> {
    let listener = bind(&config.bind_addr()).await?;
    let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let cancel = CancellationToken::new();
    let (relay, hub_task) =
        RelayHub::new(Arc::clone(&metrics), config.hub_queue).spawn(cancel.child_token());

    let state = AppState {
        relay,
        metrics,
        settings: ConnectionSettings {
            max_send_queue: config.max_send_queue,
            heartbeat_interval: config.heartbeat_interval(),
        },
        max_message_size: config.max_message_size,
    };
    let server_task = serve(listener, build_router(state), cancel.clone());

    info!(addr = %local_addr, "chat relay started");

    Ok(ServerHandle {
        local_addr,
        cancel,
        tasks: vec![server_task, hub_task],
    })
}

/// Start the one-way push server.
pub async fn start_push(config: PushConfig, metrics: Arc<MetricsRecorder>) -> Result<ServerHandle, ServerError> {
    let listener = bind(&config.bind_addr()).await?;
    let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let cancel = CancellationToken::new();
    let source = PushSource::new(config.channel_capacity);
    let source_task = source.start(
        config.interval(),
        config.message.clone(),
        metrics,
        cancel.child_token(),
    );

    let router = push::build_push_router(PushState {
        source,
        cancel: cancel.child_token(),
    });
    let server_task = serve(listener, router, cancel.clone());

    info!(addr = %local_addr, interval_ms = config.interval_ms, "push server started");

    Ok(ServerHandle {
        local_addr,
        cancel,
        tasks: vec![server_task, source_task],
    })
}

/// Handle returned by `start()`/`start_push()`; keeps background tasks alive.
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections, release every open connection, and wait
    /// for the background tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!(addr = %self.local_addr, "server stopped");
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            error!(error = %e, "server error");
        }
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| connection::handle_ws_connection(socket, state.relay, state.settings))
}

/// Health check with the current connection count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.relay.connection_count().await {
        Ok(connections) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "connections": connections })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
