use std::fmt;
use std::sync::Arc;

/// An immutable payload passed through the relay, keeping the frame kind
/// it arrived with.
///
/// Cloning is a reference-count bump, so fanning out to many recipients
/// never copies the body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Message {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl Message {
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    pub fn binary(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Binary(bytes.into())
    }

    /// Build a text message with an application label, e.g. `"alice: hi"`.
    pub fn labeled(label: &str, text: &str) -> Self {
        Self::text(format!("{label}: {text}"))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::binary(bytes)
    }
}

/// Binary bodies are shown lossily.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}
