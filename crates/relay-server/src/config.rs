//! Server configuration with environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled defaults
//! 2. Apply `RELAY_*` / `PUSH_*` environment overrides
//! 3. The binaries then apply CLI flags on top
//!
//! Invalid env values are ignored with a warning and the default stays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the chat relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `4000`, `0` for auto-assign).
    pub port: u16,
    /// Per-recipient outbound queue bound. Messages beyond it are dropped.
    pub max_send_queue: usize,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of the channel feeding the relay hub.
    pub hub_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            max_message_size: 1024 * 1024,
            hub_queue: 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any key lookup. `lookup` returns the raw value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = read_string(&lookup, "RELAY_HOST") {
            self.host = v;
        }
        if let Some(v) = read_u16(&lookup, "RELAY_PORT", 0, 65535) {
            self.port = v;
        }
        if let Some(v) = read_usize(&lookup, "RELAY_MAX_SEND_QUEUE", 1, 1_000_000) {
            self.max_send_queue = v;
        }
        if let Some(v) = read_u64(&lookup, "RELAY_HEARTBEAT_SECS", 1, 3600) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = read_usize(&lookup, "RELAY_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
            self.max_message_size = v;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Never zero, since a zero period would stall the timer.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Configuration for the one-way push server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `4001`).
    pub port: u16,
    /// Emission interval in milliseconds.
    pub interval_ms: u64,
    /// Text placed in every event's `message` field.
    pub message: String,
    /// Events buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4001,
            interval_ms: 5000,
            message: "Hello from server".into(),
            channel_capacity: 16,
        }
    }
}

impl PushConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = read_string(&lookup, "PUSH_HOST") {
            self.host = v;
        }
        if let Some(v) = read_u16(&lookup, "PUSH_PORT", 0, 65535) {
            self.port = v;
        }
        if let Some(v) = read_u64(&lookup, "PUSH_INTERVAL_MS", 10, 3_600_000) {
            self.interval_ms = v;
        }
        if let Some(v) = read_string(&lookup, "PUSH_MESSAGE") {
            self.message = v;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Lookup readers ──────────────────────────────────────────────────────────

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_u16(lookup: &impl Fn(&str) -> Option<String>, name: &str, min: u16, max: u16) -> Option<u16> {
    let val = lookup(name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = lookup(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
