pub mod connection;
pub mod errors;
pub mod ids;
pub mod message;
pub mod push;

pub use connection::{ConnectionState, StateCell};
pub use errors::RelayError;
pub use ids::ConnectionId;
pub use message::Message;
pub use push::PushEvent;
