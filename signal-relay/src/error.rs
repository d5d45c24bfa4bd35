//! Error types for signal-relay.

use std::path::PathBuf;

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire format error.
    #[error("wire format error: {0}")]
    Wire(#[from] signal_types::SignalError),
}

/// Key store errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// Failed to read the key file.
    #[error("failed to read key file {path}: {source}")]
    Read {
        /// Path to the key file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Key file exists but is not a flat JSON object of strings.
    #[error("failed to parse key file {path}: {source}")]
    Parse {
        /// Path to the key file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to serialize the key map.
    #[error("failed to encode key map: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to write or replace the key file.
    #[error("failed to write key file {path}: {source}")]
    Write {
        /// Path to the key file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Per-connection transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer did not accept the frame within the write timeout.
    #[error("send timed out")]
    Timeout,

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for key store operations.
pub type KeyStoreResult<T> = std::result::Result<T, KeyStoreError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
