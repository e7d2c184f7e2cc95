pub mod chat;
pub mod config;
pub mod error;
pub mod push;

pub use chat::{outgoing_line, run_chat, ChatExit};
pub use config::ClientConfig;
pub use error::ClientError;
pub use push::{render_payload, run_push};
