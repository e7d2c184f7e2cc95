use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle of a bidirectional connection as observed by the relay.
///
/// Transitions only move forward: `Connecting -> Open -> Closing -> Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free cell holding a connection's current state.
///
/// The connection task writes it; the relay only reads it.
#[derive(Clone, Debug)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionState::Connecting as u8)))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `next`. Returns `false` (and leaves the state unchanged)
    /// when `next` would move the lifecycle backwards.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let next = next as u8;
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (next > cur).then_some(next)
            })
            .is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.get().is_open()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ConnectionState::Connecting);
        assert!(!cell.is_open());
    }

    #[test]
    fn advances_forward() {
        let cell = StateCell::new();
        assert!(cell.advance(ConnectionState::Open));
        assert!(cell.is_open());
        assert!(cell.advance(ConnectionState::Closing));
        assert!(cell.advance(ConnectionState::Closed));
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn never_moves_backwards() {
        let cell = StateCell::new();
        cell.advance(ConnectionState::Closed);
        assert!(!cell.advance(ConnectionState::Open));
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn may_skip_states() {
        let cell = StateCell::new();
        assert!(cell.advance(ConnectionState::Closing));
        assert_eq!(cell.get(), ConnectionState::Closing);
    }

    #[test]
    fn clones_share_state() {
        let cell = StateCell::new();
        let other = cell.clone();
        cell.advance(ConnectionState::Open);
        assert!(other.is_open());
    }

    #[test]
    fn display_matches_serde() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
