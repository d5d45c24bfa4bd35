//! Envelope - the routed signaling message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{Identity, SignalError};

/// Message type discriminator for envelope routing.
///
/// The set of types is open-ended: clients may introduce new kinds without a
/// relay upgrade, so anything unrecognised is carried as [`EnvelopeKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeKind {
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// ICE candidate trickle
    IceCandidate,
    /// Incoming call invitation
    CallInvite,
    /// Call declined by the callee
    CallReject,
    /// Typing indicator
    Typing,
    /// Any type the relay does not know about
    Other(String),
}

impl EnvelopeKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeKind::Offer => "offer",
            EnvelopeKind::Answer => "answer",
            EnvelopeKind::IceCandidate => "ice_candidate",
            EnvelopeKind::CallInvite => "call_invite",
            EnvelopeKind::CallReject => "call_reject",
            EnvelopeKind::Typing => "typing",
            EnvelopeKind::Other(name) => name,
        }
    }

    /// Whether this is a high-frequency signal with no durable meaning.
    ///
    /// Losing one of these is never worth reporting.
    pub fn is_low_value(&self) -> bool {
        matches!(self, EnvelopeKind::Typing)
    }
}

impl From<String> for EnvelopeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "offer" => EnvelopeKind::Offer,
            "answer" => EnvelopeKind::Answer,
            "ice_candidate" => EnvelopeKind::IceCandidate,
            "call_invite" => EnvelopeKind::CallInvite,
            "call_reject" => EnvelopeKind::CallReject,
            "typing" => EnvelopeKind::Typing,
            _ => EnvelopeKind::Other(value),
        }
    }
}

impl From<&str> for EnvelopeKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EnvelopeKind> for String {
    fn from(kind: EnvelopeKind) -> Self {
        match kind {
            EnvelopeKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signaling envelope routed between two identities.
///
/// This is all the relay sees. `ephemeral_key` and `payload` are opaque;
/// absent optional fields are omitted when the envelope is re-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Sending identity
    #[serde(alias = "from_user")]
    pub from: Identity,
    /// Destination identity
    #[serde(alias = "to_user")]
    pub to: Identity,
    /// Base64 X25519 ephemeral public key (sent with invite/answer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_key: Option<String>,
    /// Free-form, client-encrypted payload object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

impl Envelope {
    /// Create an envelope with no key material and no payload.
    pub fn new(kind: impl Into<EnvelopeKind>, from: Identity, to: Identity) -> Self {
        Self {
            kind: kind.into(),
            from,
            to,
            ephemeral_key: None,
            payload: None,
        }
    }

    /// Attach an ephemeral public key.
    pub fn with_ephemeral_key(mut self, key: impl Into<String>) -> Self {
        self.ephemeral_key = Some(key.into());
        self
    }

    /// Attach a payload object.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Decode an envelope from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SignalError> {
        serde_json::from_str(text).map_err(SignalError::Decode)
    }

    /// Decode an envelope from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignalError> {
        serde_json::from_slice(bytes).map_err(SignalError::Decode)
    }

    /// Encode to a JSON text frame.
    pub fn to_json(&self) -> Result<String, SignalError> {
        serde_json::to_string(self).map_err(SignalError::Encode)
    }
}
