//! Why a settings layer was rejected.

use std::path::PathBuf;

use thiserror::Error;

/// A settings file that cannot be used, or a resolved value the relay
/// cannot run with.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or a key holds a value of the wrong type.
    #[error("malformed settings file {}: {source}", path.display())]
    Malformed {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// A resolved value outside what the relay accepts.
    #[error("invalid {key}: {reason}")]
    Invalid {
        /// camelCase path of the offending key, e.g. `relay.debounceMs`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
