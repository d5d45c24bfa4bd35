//! Envelope routing and offline policy.
//!
//! Delivery is attempted exactly once per inbound envelope. There is no
//! queue and no retry; an envelope for an identity without a live session is
//! dropped, and the only decision left is how loudly to say so.

use crate::registry::Registry;
use signal_types::{Envelope, EnvelopeKind, Identity};

/// Outcome of a single routing attempt.
///
/// Never reported to the sender; it exists for logging, metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the destination's live connection.
    Delivered,
    /// No live session for the destination.
    Offline,
    /// A session existed but the write failed; it has been evicted.
    Failed,
}

/// How a dropped envelope is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineAction {
    /// Debug-level note only.
    Silent,
    /// Warning-level record naming the type and destination.
    Warn,
}

/// Decide how to report an undeliverable envelope of this kind.
pub fn offline_action(kind: &EnvelopeKind) -> OfflineAction {
    if kind.is_low_value() {
        OfflineAction::Silent
    } else {
        OfflineAction::Warn
    }
}

/// Log an undeliverable envelope according to [`offline_action`].
pub fn apply_offline_policy(kind: &EnvelopeKind, to: &Identity) -> OfflineAction {
    let action = offline_action(kind);
    match action {
        OfflineAction::Silent => {
            tracing::debug!("Skipped relaying {} to offline user {}", kind, to);
        }
        OfflineAction::Warn => {
            tracing::warn!("Could not relay {} to {}: user not connected", kind, to);
        }
    }
    action
}

/// Route an inbound envelope to its destination identity.
pub async fn route(registry: &Registry, envelope: &Envelope) -> Delivery {
    tracing::debug!(
        "Routing {} from {} to {}",
        envelope.kind,
        envelope.from,
        envelope.to
    );
    registry.send(envelope, &envelope.to).await
}
