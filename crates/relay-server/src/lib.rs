pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod push;
pub mod registry;
pub mod relay;
pub mod server;

pub use config::{PushConfig, ServerConfig};
pub use error::ServerError;
pub use hub::{RelayHandle, RelayHub};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use relay::{BroadcastRelay, RelayOutcome};
pub use server::{start, start_push, ServerHandle};
