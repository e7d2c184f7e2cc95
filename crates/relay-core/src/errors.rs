use crate::ids::ConnectionId;

/// Errors surfaced by the relay core.
///
/// None of these are fatal to the relay; they describe why a single
/// command or delivery did not take effect.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),
    #[error("send queue full for {0}")]
    QueueFull(ConnectionId),
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("relay hub has stopped")]
    HubStopped,
}

impl RelayError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::DuplicateConnection(_) => "duplicate_connection",
            Self::QueueFull(_) => "queue_full",
            Self::ConnectionClosed(_) => "connection_closed",
            Self::HubStopped => "hub_stopped",
        }
    }
}
