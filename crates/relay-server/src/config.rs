//! Server and relay configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default WebSocket port the pose clients dial.
pub const DEFAULT_PORT: u16 = 9001;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// How valid payloads become broadcasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RelayMode {
    /// Broadcast each payload as soon as it is parsed.
    Immediate,
    /// Keep only the latest payload and broadcast it once the window has
    /// passed without a newer one.
    Debounced {
        /// Window length in milliseconds.
        window_ms: u64,
    },
}

impl RelayMode {
    /// The debounce window, or `None` in immediate mode.
    pub fn window(&self) -> Option<Duration> {
        match self {
            Self::Immediate => None,
            Self::Debounced { window_ms } => Some(Duration::from_millis(*window_ms)),
        }
    }
}

impl Default for RelayMode {
    fn default() -> Self {
        Self::Debounced {
            window_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Whether a payload is also delivered back to the connection that sent it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Deliver to every open connection, the sender included.
    #[default]
    IncludeSender,
    /// Deliver to every open connection except the sender.
    ExcludeSender,
}

/// Fan-out behavior of the relay engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Immediate or debounced.
    pub mode: RelayMode,
    /// Self-echo policy.
    pub echo: EchoPolicy,
}

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `9001`, `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Fan-out behavior.
    pub relay: RelayConfig,
}

impl ServerConfig {
    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_connections: 256,
            max_message_size: 1024 * 1024, // 1 MB
            send_queue_capacity: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            relay: RelayConfig::default(),
        }
    }
}
