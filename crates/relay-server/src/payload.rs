//! Opaque joint payloads and the welcome frame.
//!
//! A payload is any JSON value. It is parsed only to prove it is well-formed
//! and serialized back to compact text for fan-out; its structure (joint name
//! → `{x, y, ...}`) is never checked.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;

/// Text of the welcome message sent to every new connection.
pub const WELCOME_MESSAGE: &str = "connection established";

/// JSON welcome frame: `{"message":"connection established"}`.
pub fn welcome_frame() -> String {
    serde_json::json!({ "message": WELCOME_MESSAGE }).to_string()
}

/// A parsed, untyped pose payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointPayload(Value);

impl JointPayload {
    /// Parse raw frame text. Fails only on malformed JSON.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        serde_json::from_str(raw)
            .map(Self)
            .map_err(RelayError::InvalidPayload)
    }

    /// Compact JSON text of the payload.
    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(&self.0).map_err(RelayError::Serialize)
    }

    /// Number of top-level joints when the payload is an object.
    pub fn joint_count(&self) -> Option<usize> {
        self.0.as_object().map(serde_json::Map::len)
    }
}

impl From<Value> for JointPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
