//! WebSocket sink backed by the write half of an axum socket.

use super::SessionSink;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::Mutex;

/// Write half of a WebSocket, shared between the owning connection task and
/// any task routing an envelope to it.
pub struct WsSink {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    send_timeout: Duration,
}

impl std::fmt::Debug for WsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSink")
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl WsSink {
    /// Wrap a split WebSocket sink with a per-frame write timeout.
    pub fn new(sink: SplitSink<WebSocket, Message>, send_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            send_timeout,
        }
    }

    async fn write(&self, message: Message) -> TransportResult<()> {
        // Waiting for the lock counts against the timeout too.
        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(message).await
        };

        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::SendFailed(e.to_string())),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&self, text: String) -> TransportResult<()> {
        self.write(Message::Text(text)).await
    }

    async fn close(&self, code: u16, reason: &str) -> TransportResult<()> {
        self.write(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        })))
        .await
    }
}
