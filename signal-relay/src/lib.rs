//! # signal-relay
//!
//! Signaling relay for an end-to-end-encrypted calling app.
//!
//! This crate implements a relay server that:
//! - Accepts one WebSocket per user identity (last connect wins)
//! - Routes typed signaling envelopes (offer, answer, ICE, invites) between
//!   identities, best-effort and at most once
//! - Caches each identity's public key for discovery, persisted to a JSON file
//! - Never sees plaintext (relay is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                      ┌── Client B
//!            │   WebSocket /ws/{id} │
//!            ├─────────────────────►│
//!            │                      │
//!        ┌───┴──────────────────────┴───┐
//!        │         signal-relay         │
//!        │  gateway → router → registry │
//!        │  ┌────────────────────────┐  │
//!        │  │ KeyStore (users.json)  │  │
//!        │  └────────────────────────┘  │
//!        └──────────────────────────────┘
//! ```
//!
//! ## Endpoints
//!
//! - `GET /ws/{user_id}?pub_key=...` → `{"type":"connected"}`, then envelopes
//! - `GET /users/{user_id}/key` → identity key lookup
//! - `GET /health`, `GET /metrics`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod keystore;
pub mod registry;
pub mod router;
pub mod transport;

#[cfg(test)]
mod test_support;
