//! Fan-out of one connection's messages to every other open connection.

use std::sync::Arc;

use relay_core::{ConnectionId, Message, RelayError};
use relay_telemetry::MetricsRecorder;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionHandle, ConnectionRegistry};

pub const METRIC_CONNECTIONS: &str = "relay.connections";
pub const METRIC_OPENED: &str = "relay.connections_opened";
pub const METRIC_CLOSED: &str = "relay.connections_closed";
pub const METRIC_RECEIVED: &str = "relay.messages_received";
pub const METRIC_DELIVERED: &str = "relay.messages_delivered";
pub const METRIC_DROPPED: &str = "relay.messages_dropped";
/// Labeled with `reason`, the failing [`RelayError::error_kind`].
pub const METRIC_SEND_FAILURES: &str = "relay.send_failures";

/// Result of relaying one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Recipients the message was enqueued for.
    pub delivered: usize,
    /// Recipients skipped because they were not open.
    pub skipped: usize,
    /// Recipients whose outbound queue was full.
    pub dropped: usize,
    /// Recipients whose queue was closed; removed from the registry.
    pub disconnected: Vec<ConnectionId>,
}

/// Owns the connection registry and applies open/close/message events to it.
///
/// Not synchronized. Exactly one task (the hub) drives it.
pub struct BroadcastRelay {
    registry: ConnectionRegistry,
    metrics: Arc<MetricsRecorder>,
}

impl BroadcastRelay {
    pub fn new(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            metrics,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// A connection transitioned into `open`.
    pub fn on_open(&mut self, handle: ConnectionHandle) -> Result<(), RelayError> {
        let id = handle.id().clone();
        if !self.registry.add(handle) {
            warn!(conn_id = %id, "connection already registered");
            return Err(RelayError::DuplicateConnection(id));
        }
        self.metrics.counter_inc(METRIC_OPENED, &[], 1);
        self.record_size();
        info!(conn_id = %id, connections = self.registry.len(), "connection opened");
        Ok(())
    }

    /// A connection transitioned into `closed`. Unknown ids are ignored.
    pub fn on_close(&mut self, id: &ConnectionId) -> bool {
        if self.registry.remove(id).is_none() {
            debug!(conn_id = %id, "close for unregistered connection");
            return false;
        }
        self.metrics.counter_inc(METRIC_CLOSED, &[], 1);
        self.record_size();
        info!(conn_id = %id, connections = self.registry.len(), "connection closed");
        true
    }

    /// Enqueue `payload` for every open connection except `sender`.
    ///
    /// Never fails: each recipient's outcome is independent of the others.
    pub fn on_message(&mut self, sender: &ConnectionId, payload: &Message) -> RelayOutcome {
        self.metrics.counter_inc(METRIC_RECEIVED, &[], 1);
        let mut outcome = RelayOutcome::default();

        for conn in self.registry.iter() {
            if conn.id() == sender {
                continue;
            }
            if !conn.is_open() {
                debug!(conn_id = %conn.id(), state = %conn.state(), "skipping non-open connection");
                outcome.skipped += 1;
                continue;
            }
            let err = match conn.try_send(payload.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    continue;
                }
                Err(err) => err,
            };
            self.metrics
                .counter_inc(METRIC_SEND_FAILURES, &[("reason", err.error_kind())], 1);
            if let RelayError::QueueFull(id) = &err {
                warn!(conn_id = %id, msg_len = payload.len(), "send queue full, dropping message");
                outcome.dropped += 1;
            } else {
                warn!(conn_id = %conn.id(), error = %err, "send failed, treating as closed");
                outcome.disconnected.push(conn.id().clone());
            }
        }

        for id in &outcome.disconnected {
            self.on_close(id);
        }

        self.metrics
            .counter_inc(METRIC_DELIVERED, &[], outcome.delivered as u64);
        if outcome.dropped > 0 {
            self.metrics
                .counter_inc(METRIC_DROPPED, &[], outcome.dropped as u64);
        }
        debug!(
            sender = %sender,
            recipients = outcome.delivered,
            skipped = outcome.skipped,
            dropped = outcome.dropped,
            "relayed message"
        );
        outcome
    }

    /// Drop every connection, closing their outbound queues.
    pub fn close_all(&mut self) -> usize {
        let n = self.registry.clear();
        if n > 0 {
            self.metrics.counter_inc(METRIC_CLOSED, &[], n as u64);
        }
        self.record_size();
        n
    }

    fn record_size(&self) {
        self.metrics
            .gauge_set(METRIC_CONNECTIONS, &[], self.registry.len() as f64);
    }
}
