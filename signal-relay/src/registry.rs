//! Connection registry.
//!
//! The Registry owns the identity → live session map and the key store, and
//! is the only place envelopes are written to a client. It is created once at
//! startup and shared with every connection task as `Arc<Registry>`.
//!
//! Each map operation (replace, remove, read) is atomic per identity via
//! `DashMap`. No map guard is ever held across an `.await`: handles are
//! cloned out before any network write.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::keystore::KeyStore;
use crate::router::{self, Delivery};
use crate::transport::{SessionSink, CLOSE_DELIVERY_FAILED, CLOSE_SESSION_REPLACED};
use dashmap::DashMap;
use signal_types::{Envelope, Identity, ServerMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique id of one registered connection.
///
/// Lets cleanup from a replaced connection tell its own entry apart from
/// the one that took over.
pub type SessionId = u64;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` — no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections that completed registration.
    pub connections_total: AtomicU64,
    /// Handshakes rejected before registration (missing key, failed welcome).
    pub handshakes_rejected: AtomicU64,
    /// Sessions displaced by a newer connect for the same identity.
    pub sessions_replaced: AtomicU64,
    /// Envelopes written to a live session.
    pub envelopes_relayed: AtomicU64,
    /// Envelopes dropped because the destination had no session.
    pub offline_drops: AtomicU64,
    /// Writes to a registered session that failed (session evicted).
    pub send_failures: AtomicU64,
    /// Inbound frames that did not decode as an envelope.
    pub decode_errors: AtomicU64,
    /// Key store writes that failed.
    pub key_write_failures: AtomicU64,
}

#[derive(Clone)]
struct SessionHandle {
    id: SessionId,
    sink: Arc<dyn SessionSink>,
}

/// Identity → live session registry, composed over the [`KeyStore`].
pub struct Registry {
    config: Config,
    keys: KeyStore,
    /// Operational metrics (counters, gauges).
    metrics: RelayMetrics,
    /// At most one live session per identity.
    sessions: DashMap<Identity, SessionHandle>,
    next_session_id: AtomicU64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("sessions_count", &self.sessions.len())
            .field("known_keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry with the given config and key store.
    pub fn new(config: Config, keys: KeyStore) -> Self {
        Self {
            config,
            keys,
            metrics: RelayMetrics::default(),
            sessions: DashMap::new(),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the key store.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Register `sink` as the live session for `identity`.
    ///
    /// The key store is updated (and persisted) only if `public_key` changed.
    /// The `connected` confirmation is then written to `sink` before the
    /// session becomes routable, so it is always the first frame the client
    /// sees. Any previous session for the identity is replaced and closed in
    /// the background; a stalled old socket never delays the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the confirmation frame cannot be encoded or sent,
    /// in which case nothing was registered. A key store failure is logged,
    /// not returned.
    pub async fn connect(
        &self,
        identity: Identity,
        sink: Arc<dyn SessionSink>,
        public_key: &str,
    ) -> Result<SessionId> {
        let welcome = ServerMessage::Connected {
            user_id: identity.clone(),
        }
        .to_json()?;

        match self.keys.upsert(&identity, public_key).await {
            Ok(true) => tracing::debug!("Stored new identity key for {}", identity),
            Ok(false) => {}
            Err(e) => {
                self.metrics.key_write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Error saving key file: {}", e);
            }
        }

        if let Err(e) = sink.send_text(welcome).await {
            tracing::error!("Failed to send welcome message to {}: {}", identity, e);
            self.metrics.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::Transport(e));
        }

        // No await between here and returning: the session is live from insert.
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.sessions.insert(
            identity.clone(),
            SessionHandle {
                id,
                sink: Arc::clone(&sink),
            },
        );

        if let Some(previous) = previous {
            self.metrics.sessions_replaced.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                "User {} reconnected, closing previous session {}",
                identity,
                previous.id
            );
            close_in_background(previous, CLOSE_SESSION_REPLACED, "session replaced");
        }

        tracing::info!("User {} connected (session {})", identity, id);
        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Remove whatever session is registered for `identity`.
    ///
    /// Idempotent. Returns whether a session was removed.
    pub fn disconnect(&self, identity: &Identity) -> bool {
        let removed = self.sessions.remove(identity).is_some();
        if removed {
            tracing::info!("User {} disconnected", identity);
        }
        removed
    }

    /// Remove the session for `identity` only if it is still session `id`.
    ///
    /// Used by connection tasks on exit so that a connection which has been
    /// replaced cannot deregister its successor. Returns whether it removed.
    pub fn release(&self, identity: &Identity, id: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(identity, |_, handle| handle.id == id)
            .is_some();
        if removed {
            tracing::info!("User {} disconnected (session {})", identity, id);
        }
        removed
    }

    /// Deliver `envelope` to the live session for `to`.
    ///
    /// Never fails: an absent session triggers the offline policy, and a
    /// failed write evicts the session and is then treated as offline.
    pub async fn send(&self, envelope: &Envelope, to: &Identity) -> Delivery {
        // Clone the handle out so the shard lock is released before writing.
        let handle = self.sessions.get(to).map(|entry| entry.value().clone());

        let Some(handle) = handle else {
            self.metrics.offline_drops.fetch_add(1, Ordering::Relaxed);
            router::apply_offline_policy(&envelope.kind, to);
            return Delivery::Offline;
        };

        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode {} for {}: {}", envelope.kind, to, e);
                return Delivery::Failed;
            }
        };

        match handle.sink.send_text(frame).await {
            Ok(()) => {
                self.metrics.envelopes_relayed.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Relayed {} to {}", envelope.kind, to);
                Delivery::Delivered
            }
            Err(e) => {
                self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Failed to send message to {}: {}, evicting session {}",
                    to,
                    e,
                    handle.id
                );
                if self.release(to, handle.id) {
                    close_in_background(handle, CLOSE_DELIVERY_FAILED, "delivery failed");
                }
                router::apply_offline_policy(&envelope.kind, to);
                Delivery::Failed
            }
        }
    }

    /// Cached public identity key for `identity`. Pure read, no I/O.
    pub fn get_public_key(&self, identity: &str) -> Option<String> {
        self.keys.get(identity)
    }

    /// Whether `identity` currently has a live session.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Session id currently registered for `identity`.
    pub fn session_id(&self, identity: &str) -> Option<SessionId> {
        self.sessions.get(identity).map(|entry| entry.value().id)
    }

    /// Get total live sessions.
    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Close a session that is no longer registered without waiting on its socket.
fn close_in_background(handle: SessionHandle, code: u16, reason: &'static str) {
    tokio::spawn(async move {
        if let Err(e) = handle.sink.close(code, reason).await {
            tracing::debug!("Closing session {} failed: {}", handle.id, e);
        }
    });
}
