//! WebSocket gateway: per-connection handshake and receive loop.
//!
//! Each upgraded socket gets one [`Connection`] running on its own task:
//!
//! ```text
//! Connecting ──pub_key ok──► Connected ──close / error──► Closed
//!      │                                                    ▲
//!      └──────────── pub_key missing (1008) ────────────────┘
//! ```
//!
//! Inbound frames are decoded one at a time; a frame that is not an envelope
//! is logged and skipped without closing the connection.

use crate::registry::{Registry, SessionId};
use crate::router;
use crate::transport::{SessionSink, WsSink};
use axum::extract::ws::{close_code, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::response::Response;
use axum::Extension;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use signal_types::{Envelope, Identity, SignalError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Query parameters of the realtime channel.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Base64 long-term public identity key.
    pub pub_key: Option<String>,
}

/// Upgrade `GET /ws/{user_id}?pub_key=...` to a signaling connection.
pub async fn ws_handler(
    Extension(registry): Extension<Arc<Registry>>,
    Path(user_id): Path<String>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!("Incoming WebSocket connection attempt for: {}", user_id);

    let max_frame = registry.config().limits.max_frame_bytes;
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| {
            Connection::new(registry, Identity::from(user_id), params.pub_key).run(socket)
        })
}

/// Connection state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, handshake parameters not yet validated.
    Connecting,
    /// Registered in the registry under this session id.
    Connected(SessionId),
    /// Terminal.
    Closed,
}

/// Why the receive loop stopped.
#[derive(Debug)]
enum LoopExit {
    /// Peer sent a close frame or the stream ended.
    Clean,
    /// Transport error while reading.
    Error(axum::Error),
}

/// Removes the registry entry exactly once, however the task ends
/// (clean exit, error, panic, or the task being dropped at shutdown).
struct Registration {
    registry: Arc<Registry>,
    identity: Identity,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.identity, self.id);
    }
}

/// One client connection.
pub struct Connection {
    registry: Arc<Registry>,
    identity: Identity,
    public_key: Option<String>,
    state: ConnectionState,
}

impl Connection {
    /// Create a connection for `identity` presenting `public_key`.
    pub fn new(registry: Arc<Registry>, identity: Identity, public_key: Option<String>) -> Self {
        Self {
            registry,
            identity,
            public_key,
            state: ConnectionState::Connecting,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the connection until the socket closes.
    pub async fn run(mut self, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let send_timeout = self.registry.config().limits.send_timeout();
        let sink: Arc<dyn SessionSink> = Arc::new(WsSink::new(sink, send_timeout));

        let Some(registration) = self.handshake(Arc::clone(&sink)).await else {
            return;
        };

        match self.receive_loop(&mut stream).await {
            LoopExit::Clean => {
                tracing::debug!("Connection for {} closed by peer", self.identity);
            }
            LoopExit::Error(e) => {
                tracing::error!("WebSocket error for {}: {}", self.identity, e);
            }
        }

        drop(registration);
        self.state = ConnectionState::Closed;
    }

    /// Validate parameters and register. `None` means the connection is done.
    async fn handshake(&mut self, sink: Arc<dyn SessionSink>) -> Option<Registration> {
        let public_key = self.public_key.take().filter(|key| !key.is_empty());

        let Some(public_key) = public_key else {
            tracing::warn!("Connection rejected: pub_key missing for {}", self.identity);
            self.registry
                .metrics()
                .handshakes_rejected
                .fetch_add(1, Ordering::Relaxed);
            if let Err(e) = sink.close(close_code::POLICY, "pub_key required").await {
                tracing::debug!("Close after rejection failed for {}: {}", self.identity, e);
            }
            self.state = ConnectionState::Closed;
            return None;
        };

        tracing::info!(
            "Connecting user {} with key {}...",
            self.identity,
            key_prefix(&public_key)
        );

        match self
            .registry
            .connect(self.identity.clone(), Arc::clone(&sink), &public_key)
            .await
        {
            Ok(id) => {
                self.state = ConnectionState::Connected(id);
                Some(Registration {
                    registry: Arc::clone(&self.registry),
                    identity: self.identity.clone(),
                    id,
                })
            }
            Err(e) => {
                tracing::warn!("Registration failed for {}: {}", self.identity, e);
                if let Err(e) = sink.close(close_code::ERROR, "registration failed").await {
                    tracing::debug!("Close after failed registration for {}: {}", self.identity, e);
                }
                self.state = ConnectionState::Closed;
                None
            }
        }
    }

    /// Read frames until the peer goes away.
    async fn receive_loop<S>(&self, stream: &mut S) -> LoopExit
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        while let Some(frame) = stream.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => return LoopExit::Error(e),
            };

            let decoded = match message {
                Message::Text(text) => Envelope::from_json(&text),
                Message::Binary(bytes) => Envelope::from_slice(&bytes),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return LoopExit::Clean,
            };

            self.handle_decoded(decoded).await;
        }

        LoopExit::Clean
    }

    async fn handle_decoded(&self, decoded: Result<Envelope, SignalError>) {
        match decoded {
            Ok(envelope) => {
                tracing::debug!("Received msg from {}: {}", self.identity, envelope.kind);
                router::route(&self.registry, &envelope).await;
            }
            Err(e) => {
                self.registry
                    .metrics()
                    .decode_errors
                    .fetch_add(1, Ordering::Relaxed);
                tracing::error!("Error processing message from {}: {}", self.identity, e);
            }
        }
    }
}

/// First characters of a key, for logs.
fn key_prefix(key: &str) -> &str {
    match key.char_indices().nth(10) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
