//! Error types for the signaling wire format.

use thiserror::Error;

/// Errors that can occur while encoding or decoding signaling frames.
#[derive(Debug, Error)]
pub enum SignalError {
    /// JSON encoding failed
    #[error("encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding failed
    #[error("decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}
