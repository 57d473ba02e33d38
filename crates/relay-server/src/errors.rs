//! Relay server error types.

use thiserror::Error;

/// Errors surfaced by the relay server.
///
/// Only [`RelayError::Bind`] is fatal to the process. Payload errors are
/// per-message and never leave the relay engine.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// Other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Inbound text was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    /// A payload could not be turned back into JSON text.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The relay engine task has stopped.
    #[error("relay engine is not running")]
    EngineClosed,
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
