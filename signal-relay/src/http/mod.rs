//! HTTP endpoints for signal-relay.
//!
//! Provides health checks, key lookup, metrics, and the WebSocket upgrade.

pub mod health;
pub mod keys;
mod metrics;

use crate::gateway;
use crate::registry::Registry;
use axum::{routing::get, Extension, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use health::HealthStatus;
pub use keys::KeyRecord;

/// Build the HTTP router with all endpoints.
pub fn build_router(registry: Arc<Registry>) -> Router {
    let mut router = Router::new()
        .route("/", get(health::health_handler))
        .route("/health", get(health::health_handler))
        .route("/users/:user_id/key", get(keys::key_handler))
        .route("/ws/:user_id", get(gateway::ws_handler));

    if registry.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(registry))
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the accept loop fails.
pub async fn serve<F>(
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    health::init_start_time();
    axum::serve(listener, build_router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}
