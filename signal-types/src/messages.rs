//! Frames originated by the relay itself.

use serde::{Deserialize, Serialize};

use crate::{Identity, SignalError};

/// Messages the relay sends on its own behalf (never routed envelopes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection confirmation, sent exactly once after registration
    Connected {
        /// The identity the connection was registered under
        user_id: Identity,
    },
}

impl ServerMessage {
    /// Encode to a JSON text frame.
    pub fn to_json(&self) -> Result<String, SignalError> {
        serde_json::to_string(self).map_err(SignalError::Encode)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SignalError> {
        serde_json::from_str(text).map_err(SignalError::Decode)
    }
}
