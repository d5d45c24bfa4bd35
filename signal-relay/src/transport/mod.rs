//! Outbound half of a client connection.
//!
//! The registry never owns a socket directly. It holds an
//! `Arc<dyn SessionSink>` per identity, which lets routing logic be tested
//! against [`MockSink`] while production uses [`WsSink`] over an axum
//! WebSocket.
//!
//! # Design
//!
//! - `send_text()` writes one JSON frame, bounded by the write timeout
//! - `close()` sends a close frame with a status code
//!
//! Both are safe to call concurrently from different tasks; implementations
//! serialize writes internally.

mod mock;
mod ws;

pub use mock::MockSink;
pub use ws::WsSink;

use crate::error::TransportResult;
use async_trait::async_trait;

/// Status code sent when a newer connection for the same identity takes over.
pub const CLOSE_SESSION_REPLACED: u16 = 4000;

/// Status code sent to a session evicted after a failed write (1011).
pub const CLOSE_DELIVERY_FAILED: u16 = 1011;

/// Writable side of one live connection.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Send a single text frame.
    ///
    /// Fails if the peer is gone or does not accept the frame in time.
    async fn send_text(&self, text: String) -> TransportResult<()>;

    /// Close the connection with a status code and reason.
    async fn close(&self, code: u16, reason: &str) -> TransportResult<()>;
}
