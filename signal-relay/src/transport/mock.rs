//! Mock sink for testing.
//!
//! Captures sent frames and close calls, and can be told to fail.

use super::SessionSink;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Mock sink for testing.
///
/// Clones share state, so a test can keep one handle while the registry
/// holds another.
#[derive(Debug, Default, Clone)]
pub struct MockSink {
    inner: Arc<Mutex<MockSinkInner>>,
}

#[derive(Debug, Default)]
struct MockSinkInner {
    sent_frames: Vec<String>,
    closed: Option<(u16, String)>,
    fail_next_send: Option<String>,
    dead: bool,
}

impl MockSink {
    /// Create a new mock sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All text frames sent so far.
    pub fn sent_frames(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_frames.clone()
    }

    /// All text frames sent so far, parsed as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Close code and reason, if `close()` was called.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        let inner = self.inner.lock().unwrap();
        inner.closed.clone()
    }

    /// Cause the next send to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Make every subsequent send fail, as if the peer vanished.
    pub fn kill(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.dead = true;
    }
}

#[async_trait]
impl SessionSink for MockSink {
    async fn send_text(&self, text: String) -> TransportResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if inner.dead || inner.closed.is_some() {
            return Err(TransportError::Closed);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_frames.push(text);
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> TransportResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = Some((code, reason.to_string()));
        Ok(())
    }
}
