//! # relay-settings
//!
//! Layered configuration for the pose relay server.
//!
//! Settings are resolved in priority order:
//! 1. **Compiled defaults**: [`PoseRelaySettings::default()`]
//! 2. **Settings file**: `~/.pose-relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `POSE_RELAY_*` overrides
//!
//! The binary applies its CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
