//! # relay-server
//!
//! Axum `WebSocket` relay for pose/joint payloads.
//!
//! - `WebSocket` gateway on `/` and `/ws`: welcome frame, heartbeat, per-client send queues
//! - Relay engine: a single task owning the connection registry, fanning each
//!   valid JSON payload out to every open connection, immediately or after a
//!   trailing-edge debounce window
//! - HTTP endpoints: `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod payload;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{EchoPolicy, RelayConfig, RelayMode, ServerConfig};
pub use errors::RelayError;
pub use payload::JointPayload;
pub use relay::{RelayHandle, RelayStats};
pub use server::{RelayServer, RunningServer};
pub use websocket::connection::ConnectionId;
