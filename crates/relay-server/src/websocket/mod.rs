//! WebSocket connection state, heartbeat, fan-out registry, and the per-client session loop.

pub mod connection;
pub mod heartbeat;
pub mod registry;
pub mod session;
