//! One-way push: a periodic event source fanned out over Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{future, Stream, StreamExt};
use relay_core::PushEvent;
use relay_telemetry::MetricsRecorder;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const METRIC_EMITTED: &str = "push.events_emitted";

/// Emits a [`PushEvent`] every interval to all current subscribers.
#[derive(Clone)]
pub struct PushSource {
    tx: broadcast::Sender<PushEvent>,
}

impl PushSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish one event. Returns how many subscribers it reached.
    pub fn emit(&self, event: PushEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Start the timer. The first event fires one full `period` after start.
    pub fn start(
        &self,
        period: Duration,
        message: String,
        metrics: Arc<MetricsRecorder>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let reached = source.emit(PushEvent::new(message.as_str()));
                        metrics.counter_inc(METRIC_EMITTED, &[], 1);
                        debug!(subscribers = reached, "push event emitted");
                    }
                }
            }
            info!("push source stopped");
        })
    }

    /// SSE stream for one subscriber, ending when `cancel` fires.
    /// Lagging subscribers skip what they missed.
    pub fn sse_stream(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        BroadcastStream::new(self.subscribe())
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => match Event::default().json_data(&event) {
                        Ok(sse) => Some(Ok(sse)),
                        Err(e) => {
                            warn!(error = %e, "failed to encode push event");
                            None
                        }
                    },
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        warn!(skipped = n, "push subscriber lagged, dropped events");
                        None
                    }
                })
            })
            .take_until(cancel.cancelled_owned())
    }
}

#[derive(Clone)]
pub struct PushState {
    pub source: PushSource,
    /// Ends open event streams on shutdown.
    pub cancel: CancellationToken,
}

pub fn build_push_router(state: PushState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/health", get(push_health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn events_handler(State(state): State<PushState>) -> impl IntoResponse {
    info!(subscribers = state.source.subscriber_count() + 1, "push subscriber connected");
    Sse::new(state.source.sse_stream(state.cancel.clone())).keep_alive(KeepAlive::default())
}

async fn push_health_handler(State(state): State<PushState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "subscribers": state.source.subscriber_count(),
    }))
}
