//! Membership of currently-open connections.
//!
//! The registry is a plain owned map. It is never shared: the relay hub task
//! owns it, so every add/remove/iterate is already serialized.

use std::collections::HashMap;

use relay_core::{ConnectionId, ConnectionState, Message, RelayError, StateCell};
use tokio::sync::mpsc;

/// The relay's view of one connection: identity, lifecycle state and the
/// sending half of its bounded outbound queue.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    state: StateCell,
    tx: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, state: StateCell, tx: mpsc::Sender<Message>) -> Self {
        Self { id, state, tx }
    }

    /// Create a handle in the `connecting` state together with the receiving
    /// end of its outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new(), StateCell::new(), tx), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, message: Message) -> Result<(), RelayError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueFull(self.id.clone()),
            mpsc::error::TrySendError::Closed(_) => RelayError::ConnectionClosed(self.id.clone()),
        })
    }
}

/// Set of open connections keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly opened connection. Returns `false` and keeps the
    /// existing entry if the id is already present.
    pub fn add(&mut self, handle: ConnectionHandle) -> bool {
        if self.contains(handle.id()) {
            return false;
        }
        self.connections.insert(handle.id().clone(), handle);
        true
    }

    /// Remove a connection. A missing id is not an error; close events may
    /// arrive after an implicit removal.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every entry, closing all outbound queues.
    pub fn clear(&mut self) -> usize {
        let n = self.connections.len();
        self.connections.clear();
        n
    }
}
