//! Prometheus metrics endpoint.

use crate::registry::Registry;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(registry): Extension<Arc<Registry>>) -> impl IntoResponse {
    let m = registry.metrics();

    // Gauges — current state
    let sessions = registry.total_sessions();
    let known_keys = registry.keys().len();

    // Counters — monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let rejected = m.handshakes_rejected.load(Ordering::Relaxed);
    let replaced = m.sessions_replaced.load(Ordering::Relaxed);
    let relayed = m.envelopes_relayed.load(Ordering::Relaxed);
    let offline = m.offline_drops.load(Ordering::Relaxed);
    let send_failures = m.send_failures.load(Ordering::Relaxed);
    let decode_errors = m.decode_errors.load(Ordering::Relaxed);
    let key_writes = registry.keys().writes();
    let key_write_failures = m.key_write_failures.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP signal_relay_sessions_active Number of live sessions
# TYPE signal_relay_sessions_active gauge
signal_relay_sessions_active {sessions}

# HELP signal_relay_known_keys Number of identities with a stored public key
# TYPE signal_relay_known_keys gauge
signal_relay_known_keys {known_keys}

# HELP signal_relay_info Server information
# TYPE signal_relay_info gauge
signal_relay_info{{version="{version}"}} 1

# HELP signal_relay_connections_total Total connections registered
# TYPE signal_relay_connections_total counter
signal_relay_connections_total {conns_total}

# HELP signal_relay_handshakes_rejected_total Total handshakes rejected before registration
# TYPE signal_relay_handshakes_rejected_total counter
signal_relay_handshakes_rejected_total {rejected}

# HELP signal_relay_sessions_replaced_total Total sessions displaced by a reconnect
# TYPE signal_relay_sessions_replaced_total counter
signal_relay_sessions_replaced_total {replaced}

# HELP signal_relay_envelopes_relayed_total Total envelopes delivered
# TYPE signal_relay_envelopes_relayed_total counter
signal_relay_envelopes_relayed_total {relayed}

# HELP signal_relay_offline_drops_total Total envelopes dropped for offline identities
# TYPE signal_relay_offline_drops_total counter
signal_relay_offline_drops_total {offline}

# HELP signal_relay_send_failures_total Total failed writes to registered sessions
# TYPE signal_relay_send_failures_total counter
signal_relay_send_failures_total {send_failures}

# HELP signal_relay_decode_errors_total Total inbound frames that were not envelopes
# TYPE signal_relay_decode_errors_total counter
signal_relay_decode_errors_total {decode_errors}

# HELP signal_relay_key_writes_total Total key file writes attempted
# TYPE signal_relay_key_writes_total counter
signal_relay_key_writes_total {key_writes}

# HELP signal_relay_key_write_failures_total Total key file writes that failed
# TYPE signal_relay_key_write_failures_total counter
signal_relay_key_write_failures_total {key_write_failures}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
