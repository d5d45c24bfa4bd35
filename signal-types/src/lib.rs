//! # signal-types
//!
//! Wire format types for the E2EE signaling relay.
//!
//! This crate provides the types shared by the relay and its clients:
//! - [`Identity`] - Opaque user identity, the routing key
//! - [`Envelope`] and [`EnvelopeKind`] - Routed signaling messages
//! - [`ServerMessage`] - Frames originated by the relay itself
//! - [`SignalError`] - Error types
//!
//! Everything travels as one JSON object per frame. The relay never looks
//! inside `payload` or `ephemeral_key`; both are end-to-end encrypted material.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod identity;
mod messages;

pub use envelope::{Envelope, EnvelopeKind};
pub use error::SignalError;
pub use identity::Identity;
pub use messages::ServerMessage;
