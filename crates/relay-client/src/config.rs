use serde::{Deserialize, Serialize};

/// Where the terminal clients connect and how they label outgoing lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub chat_port: u16,
    pub push_port: u16,
    /// Prefix for outgoing chat lines, e.g. `"alice"` sends `"alice: hi"`.
    pub label: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            chat_port: 4000,
            push_port: 4001,
            label: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Reads `RELAY_CLIENT_HOST`, `RELAY_PORT`, `PUSH_PORT` and `CHAT_NAME`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_CLIENT_HOST").filter(|v| !v.is_empty()) {
            self.host = v;
        }
        if let Some(v) = lookup("RELAY_PORT").and_then(|v| parse_port(&v)) {
            self.chat_port = v;
        }
        if let Some(v) = lookup("PUSH_PORT").and_then(|v| parse_port(&v)) {
            self.push_port = v;
        }
        if let Some(v) = lookup("CHAT_NAME") {
            let v = v.trim();
            if !v.is_empty() {
                self.label = Some(v.to_string());
            }
        }
    }

    pub fn chat_url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.chat_port)
    }

    pub fn push_url(&self) -> String {
        format!("http://{}:{}/events", self.host, self.push_port)
    }
}

fn parse_port(val: &str) -> Option<u16> {
    let port: u16 = val.trim().parse().ok()?;
    if port == 0 {
        tracing::warn!(value = %val, "port 0 is not connectable, ignoring");
        return None;
    }
    Some(port)
}
