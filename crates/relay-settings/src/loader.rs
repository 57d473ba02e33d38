//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PoseRelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `POSE_RELAY_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{PoseRelaySettings, RelayModeSetting};

/// Resolve the default settings file path (`~/.pose-relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pose-relay").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a combination rejected by
/// [`PoseRelaySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PoseRelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<PoseRelaySettings> {
    let malformed = |source: serde_json::Error| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(PoseRelaySettings::default()).map_err(malformed)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(malformed)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut PoseRelaySettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides_with<F>(settings: &mut PoseRelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("POSE_RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("POSE_RELAY_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => invalid("POSE_RELAY_PORT", &v),
        }
    }
    if let Some(v) = read("POSE_RELAY_MAX_CONNECTIONS") {
        match parse_usize_range(&v, 1, 100_000) {
            Some(n) => settings.server.max_connections = n,
            None => invalid("POSE_RELAY_MAX_CONNECTIONS", &v),
        }
    }
    if let Some(v) = read("POSE_RELAY_MODE") {
        match RelayModeSetting::parse(&v) {
            Some(mode) => settings.relay.mode = mode,
            None => invalid("POSE_RELAY_MODE", &v),
        }
    }
    if let Some(v) = read("POSE_RELAY_DEBOUNCE_MS") {
        match parse_u64_range(&v, 1, 60_000) {
            Some(ms) => settings.relay.debounce_ms = ms,
            None => invalid("POSE_RELAY_DEBOUNCE_MS", &v),
        }
    }
    if let Some(v) = read("POSE_RELAY_ECHO_SENDER") {
        match parse_bool(&v) {
            Some(b) => settings.relay.echo_to_sender = b,
            None => invalid("POSE_RELAY_ECHO_SENDER", &v),
        }
    }
    if let Some(v) = read("POSE_RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env override, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
