//! The relay hub: sole owner of connection membership.
//!
//! Per-connection tasks never touch the registry directly. They send
//! commands over one channel, and the hub applies them in arrival order.
//! Since each connection's reader is a single task feeding that channel,
//! messages from one sender reach the relay in the order they were read.

use std::sync::Arc;

use relay_core::{ConnectionId, Message, RelayError};
use relay_telemetry::MetricsRecorder;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::ConnectionHandle;
use crate::relay::BroadcastRelay;

enum Command {
    Open(ConnectionHandle),
    Close(ConnectionId),
    Message { from: ConnectionId, payload: Message },
    Count(oneshot::Sender<usize>),
}

/// Cloneable client of the hub task.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<Command>,
}

impl RelayHandle {
    /// Register a connection that just became open.
    pub async fn open(&self, handle: ConnectionHandle) -> Result<(), RelayError> {
        self.send(Command::Open(handle)).await
    }

    /// Deregister a connection that just closed.
    pub async fn close(&self, id: ConnectionId) -> Result<(), RelayError> {
        self.send(Command::Close(id)).await
    }

    /// Relay `payload` from `from`. Returns once the hub has accepted the
    /// message, not once it is delivered.
    pub async fn message(&self, from: ConnectionId, payload: Message) -> Result<(), RelayError> {
        self.send(Command::Message { from, payload }).await
    }

    pub async fn connection_count(&self) -> Result<usize, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Count(reply)).await?;
        rx.await.map_err(|_| RelayError::HubStopped)
    }

    async fn send(&self, cmd: Command) -> Result<(), RelayError> {
        self.tx.send(cmd).await.map_err(|_| RelayError::HubStopped)
    }
}

/// Builder for the hub task.
pub struct RelayHub {
    relay: BroadcastRelay,
    queue: usize,
}

impl RelayHub {
    pub fn new(metrics: Arc<MetricsRecorder>, queue: usize) -> Self {
        Self {
            relay: BroadcastRelay::new(metrics),
            queue: queue.max(1),
        }
    }

    /// Start the hub. It runs until `cancel` fires or every handle is dropped;
    /// on exit all registered connections are released.
    pub fn spawn(self, cancel: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.queue);
        let task = tokio::spawn(self.run(rx, cancel));
        (RelayHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        info!("relay hub started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("relay hub cancelled");
                    break;
                }
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all relay handles dropped");
                        break;
                    };
                    self.apply(cmd);
                }
            }
        }
        let released = self.relay.close_all();
        info!(released, "relay hub stopped");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Open(handle) => {
                let _ = self.relay.on_open(handle);
            }
            Command::Close(id) => {
                self.relay.on_close(&id);
            }
            Command::Message { from, payload } => {
                self.relay.on_message(&from, &payload);
            }
            Command::Count(reply) => {
                let _ = reply.send(self.relay.connection_count());
            }
        }
    }
}
