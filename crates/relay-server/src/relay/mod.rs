//! Relay engine: connection registry, optional debounce, fan-out.

pub mod debounce;
pub mod engine;
pub mod handle;

pub use engine::{MessageOutcome, RelayEngine, RelayEvent, RelayStats};
pub use handle::{RelayHandle, spawn_engine};
