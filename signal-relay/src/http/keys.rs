//! Identity key lookup endpoint.
//!
//! A pass-through read of the key store; it never touches live sessions.

use crate::registry::Registry;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use signal_types::Identity;
use std::sync::Arc;

/// Key lookup response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// The identity that was looked up.
    pub user_id: Identity,
    /// Its last-known base64 public identity key.
    pub public_identity_key: String,
}

/// `GET /users/{user_id}/key`
pub async fn key_handler(
    Extension(registry): Extension<Arc<Registry>>,
    Path(user_id): Path<String>,
) -> Response {
    match registry.get_public_key(&user_id) {
        Some(public_identity_key) => Json(KeyRecord {
            user_id: Identity::from(user_id),
            public_identity_key,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "User not found" })),
        )
            .into_response(),
    }
}
