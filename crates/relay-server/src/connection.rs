//! One WebSocket connection: a reader task feeding the hub and a writer task
//! draining the connection's outbound queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, ConnectionState, Message};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::hub::RelayHandle;
use crate::registry::ConnectionHandle;

/// Heartbeats a peer may leave unanswered before it is dropped.
pub const MISSED_HEARTBEATS: u32 = 3;

/// Per-connection settings taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionSettings {
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
}

impl ConnectionSettings {
    /// How long a peer may stay silent before it counts as gone.
    pub fn idle_timeout(&self) -> Duration {
        self.heartbeat_interval * MISSED_HEARTBEATS
    }
}

/// Time of the last frame received from the peer, pongs included.
#[derive(Debug)]
pub struct Liveness {
    started: Instant,
    last_seen_ms: AtomicU64,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    pub fn record(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_seen_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the peer was last heard from.
    pub fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a WebSocket from open to closed.
///
/// Returns when either direction ends (close frame, transport error, an
/// unresponsive peer, or the hub releasing the connection). The connection
/// is deregistered before this returns.
pub async fn handle_ws_connection(socket: WebSocket, relay: RelayHandle, settings: ConnectionSettings) {
    let (handle, rx) = ConnectionHandle::channel(settings.max_send_queue);
    let id = handle.id().clone();
    let state = handle.state_cell().clone();

    state.advance(ConnectionState::Open);
    if relay.open(handle).await.is_err() {
        warn!(conn_id = %id, "relay hub unavailable, dropping connection");
        return;
    }

    let liveness = Arc::new(Liveness::new());
    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        id.clone(),
        settings,
        Arc::clone(&liveness),
    ));
    let mut reader = tokio::spawn(read_loop(ws_rx, id.clone(), relay.clone(), liveness));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.advance(ConnectionState::Closing);
    let _ = relay.close(id.clone()).await;
    state.advance(ConnectionState::Closed);
    debug!(conn_id = %id, "connection task finished");
}

fn to_frame(msg: Message) -> WsMessage {
    match msg {
        Message::Text(text) => WsMessage::Text((&*text).into()),
        Message::Binary(bytes) => WsMessage::Binary(bytes.to_vec().into()),
    }
}

/// Forward queued messages to the socket, ping periodically, and give up on
/// a peer that has not answered for [`ConnectionSettings::idle_timeout`].
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Message>,
    id: ConnectionId,
    settings: ConnectionSettings,
    liveness: Arc<Liveness>,
) {
    let idle_timeout = settings.idle_timeout();
    let mut ping_interval = tokio::time::interval(settings.heartbeat_interval);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(conn_id = %id, "outbound queue closed");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(to_frame(msg)).await {
                    warn!(conn_id = %id, error = %e, "websocket send failed");
                    break;
                }
            }
            _ = ping_interval.tick() => {
                let idle = liveness.idle();
                if idle >= idle_timeout {
                    warn!(conn_id = %id, idle_ms = idle.as_millis() as u64, "peer unresponsive, closing");
                    break;
                }
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                trace!(conn_id = %id, "sent ping");
            }
        }
    }
}

/// Forward inbound frames to the hub until the peer goes away.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    id: ConnectionId,
    relay: RelayHandle,
    liveness: Arc<Liveness>,
) {
    while let Some(frame) = ws_rx.next().await {
        if frame.is_ok() {
            liveness.record();
        }
        let payload = match frame {
            Ok(WsMessage::Text(text)) => Message::from(text.as_str()),
            Ok(WsMessage::Binary(bytes)) => Message::binary(&bytes[..]),
            Ok(WsMessage::Close(_)) => {
                info!(conn_id = %id, "peer closed connection");
                break;
            }
            Ok(WsMessage::Pong(_)) => {
                trace!(conn_id = %id, "pong");
                continue;
            }
            // axum answers pings itself
            Ok(WsMessage::Ping(_)) => continue,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "websocket receive failed");
                break;
            }
        };
        if relay.message(id.clone(), payload).await.is_err() {
            break;
        }
    }
}
