//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields get their compiled default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the pose relay.
///
/// ```json
/// {
///   "server": { "port": 9001 },
///   "relay": { "mode": "debounced", "debounceMs": 200 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoseRelaySettings {
    /// Network and connection limits.
    pub server: ServerSettings,
    /// Fan-out behavior.
    pub relay: RelayBehaviorSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PoseRelaySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(SettingsError::Invalid {
                key: "server.maxConnections",
                reason: "must be at least 1".into(),
            });
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::Invalid {
                key: "server.sendQueueCapacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::Invalid {
                key: "server.heartbeatTimeoutMs",
                reason: format!(
                    "{} is shorter than heartbeatIntervalMs ({})",
                    self.server.heartbeat_timeout_ms, self.server.heartbeat_interval_ms
                ),
            });
        }
        if self.relay.mode == RelayModeSetting::Debounced && self.relay.debounce_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "relay.debounceMs",
                reason: "must be > 0 in debounced mode".into(),
            });
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket port.
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before drops start.
    pub send_queue_capacity: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A connection silent for longer than this is closed, in milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            max_connections: 256,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
        }
    }
}

/// How inbound payloads are turned into broadcasts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayModeSetting {
    /// Every valid payload is broadcast as soon as it is parsed.
    Immediate,
    /// Bursts collapse into one broadcast of the latest payload.
    #[default]
    Debounced,
}

impl RelayModeSetting {
    /// Parse a mode name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "debounced" | "debounce" => Some(Self::Debounced),
            _ => None,
        }
    }
}

/// Fan-out behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayBehaviorSettings {
    /// Immediate or debounced relay.
    pub mode: RelayModeSetting,
    /// Debounce window in milliseconds (debounced mode only).
    pub debounce_ms: u64,
    /// Whether the sender also receives its own payload.
    pub echo_to_sender: bool,
}

impl Default for RelayBehaviorSettings {
    fn default() -> Self {
        Self {
            mode: RelayModeSetting::Debounced,
            debounce_ms: 200,
            echo_to_sender: true,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact formatter.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_setup() {
        let s = PoseRelaySettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9001);
        assert_eq!(s.relay.mode, RelayModeSetting::Debounced);
        assert_eq!(s.relay.debounce_ms, 200);
        assert!(s.relay.echo_to_sender);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn defaults_validate() {
        assert!(PoseRelaySettings::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: PoseRelaySettings =
            serde_json::from_str(r#"{"relay":{"mode":"immediate"}}"#).unwrap();
        assert_eq!(s.relay.mode, RelayModeSetting::Immediate);
        assert_eq!(s.relay.debounce_ms, 200);
        assert_eq!(s.server.port, 9001);
    }

    #[test]
    fn camel_case_field_names() {
        let json = serde_json::to_value(PoseRelaySettings::default()).unwrap();
        assert!(json["server"].get("maxConnections").is_some());
        assert!(json["server"].get("heartbeatIntervalMs").is_some());
        assert!(json["relay"].get("debounceMs").is_some());
        assert!(json["relay"].get("echoToSender").is_some());
        assert_eq!(json["relay"]["mode"], "debounced");
    }

    #[test]
    fn zero_debounce_rejected_only_when_debounced() {
        let mut s = PoseRelaySettings::default();
        s.relay.debounce_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::Invalid { .. })));

        s.relay.mode = RelayModeSetting::Immediate;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let mut s = PoseRelaySettings::default();
        s.server.max_connections = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn heartbeat_timeout_shorter_than_interval_rejected() {
        let mut s = PoseRelaySettings::default();
        s.server.heartbeat_interval_ms = 10_000;
        s.server.heartbeat_timeout_ms = 5_000;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeatTimeoutMs"));
    }

    #[test]
    fn mode_parse() {
        assert_eq!(RelayModeSetting::parse("Immediate"), Some(RelayModeSetting::Immediate));
        assert_eq!(RelayModeSetting::parse("debounce"), Some(RelayModeSetting::Debounced));
        assert_eq!(RelayModeSetting::parse("sometimes"), None);
    }
}
