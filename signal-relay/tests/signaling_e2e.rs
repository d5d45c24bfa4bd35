//! End-to-end tests against a live relay over real WebSockets.
//!
//! Tests cover:
//! - Key discovery after connect
//! - Offline policy for routed envelopes (offer warns, typing is silent)
//! - Delivery to a live peer, byte-for-byte
//! - Deregistration on disconnect and takeover by a second connect
//! - Handshake rejection without a public key
//! - Malformed frames not ending the session
//! - Key persistence across a restart

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::util::ServiceExt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use e2ee_signal_relay::config::Config;
use e2ee_signal_relay::http::{build_router, serve};
use e2ee_signal_relay::keystore::KeyStore;
use e2ee_signal_relay::registry::Registry;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ========================================
// Test Helpers
// ========================================

struct Relay {
    addr: SocketAddr,
    registry: Arc<Registry>,
    dir: TempDir,
}

impl Relay {
    async fn start() -> Self {
        Self::start_in(tempfile::tempdir().expect("temp dir")).await
    }

    async fn start_in(dir: TempDir) -> Self {
        let mut config = Config::default();
        config.storage.keys_file = dir.path().join("users.json");
        config.limits.send_timeout_secs = 2;

        let keys = KeyStore::open(&config.storage.keys_file);
        let registry = Arc::new(Registry::new(config, keys));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(serve(
            listener,
            Arc::clone(&registry),
            std::future::pending(),
        ));

        Self {
            addr,
            registry,
            dir,
        }
    }

    /// Open a socket without reading anything.
    async fn open(&self, path: &str) -> Client {
        let (client, _) = connect_async(format!("ws://{}{}", self.addr, path))
            .await
            .expect("websocket connect");
        client
    }

    /// Connect `user` with `key` and consume the welcome frame.
    async fn connect(&self, user: &str, key: &str) -> Client {
        let mut client = self.open(&format!("/ws/{user}?pub_key={key}")).await;
        let welcome = next_json(&mut client).await;
        assert_eq!(welcome, json!({"type": "connected", "user_id": user}));
        client
    }

    async fn lookup_key(&self, user: &str) -> (StatusCode, Value) {
        let response = build_router(Arc::clone(&self.registry))
            .oneshot(
                Request::builder()
                    .uri(format!("/users/{user}/key"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn offline_drops(&self) -> u64 {
        self.registry.metrics().offline_drops.load(Ordering::Relaxed)
    }
}

/// Next JSON text frame, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive for a short while.
async fn assert_silent(client: &mut Client) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    loop {
        match tokio::time::timeout_at(deadline, client.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .expect("send frame");
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Counts warning and error events on the current thread.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ========================================
// Scenarios
// ========================================

#[tokio::test]
async fn connect_publishes_key_for_lookup() {
    let relay = Relay::start().await;

    let (status, _) = relay.lookup_key("A").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _a = relay.connect("A", "K1").await;

    let (status, body) = relay.lookup_key("A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"user_id": "A", "public_identity_key": "K1"}));
}

#[tokio::test]
async fn offer_to_never_connected_peer_is_dropped_quietly() {
    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;

    send_json(&mut a, json!({"type": "offer", "from": "A", "to": "B"})).await;
    wait_until("offline drop", || relay.offline_drops() == 1).await;

    assert_silent(&mut a).await;
    assert!(!relay.registry.is_connected("B"));
}

#[tokio::test]
async fn offer_reaches_connected_peer_exactly_once() {
    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;

    send_json(&mut a, json!({"type": "offer", "from": "A", "to": "B"})).await;
    wait_until("offline drop", || relay.offline_drops() == 1).await;

    let mut b = relay.connect("B", "K2").await;
    send_json(&mut a, json!({"type": "offer", "from": "A", "to": "B"})).await;

    assert_eq!(
        next_json(&mut b).await,
        json!({"type": "offer", "from": "A", "to": "B"})
    );
    assert_silent(&mut b).await;
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn payload_and_ephemeral_key_pass_through() {
    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;
    let mut b = relay.connect("B", "K2").await;

    let invite = json!({
        "type": "call_invite",
        "from": "A",
        "to": "B",
        "ephemeral_key": "ZXBoZW1lcmFs",
        "payload": {"ciphertext": "Y3Q=", "iv": "aXY=", "tag": "dGFn"}
    });
    send_json(&mut a, invite.clone()).await;

    assert_eq!(next_json(&mut b).await, invite);
}

#[tokio::test]
async fn typing_to_offline_peer_emits_no_warning() {
    let warnings = WarnCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));

    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;

    send_json(&mut a, json!({"type": "typing", "from": "A", "to": "C"})).await;
    wait_until("offline drop", || relay.offline_drops() == 1).await;

    assert_eq!(warnings.0.load(Ordering::SeqCst), 0);
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn send_after_disconnect_follows_offline_policy() {
    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;
    let mut b = relay.connect("B", "K2").await;

    a.close(None).await.expect("close");
    drop(a);
    wait_until("A deregistered", || !relay.registry.is_connected("A")).await;

    send_json(&mut b, json!({"type": "answer", "from": "B", "to": "A"})).await;
    wait_until("offline drop", || relay.offline_drops() == 1).await;

    assert_silent(&mut b).await;
    assert!(relay.registry.is_connected("B"));
    // Key outlives the session.
    assert_eq!(relay.registry.get_public_key("A").as_deref(), Some("K1"));
}

#[tokio::test]
async fn missing_pub_key_is_closed_with_policy_violation() {
    let relay = Relay::start().await;

    for path in ["/ws/A", "/ws/A?pub_key="] {
        let mut client = relay.open(path).await;
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("websocket error");

        match frame {
            Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1008),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    assert!(!relay.registry.is_connected("A"));
    assert_eq!(relay.registry.get_public_key("A"), None);
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let relay = Relay::start().await;
    let mut a = relay.connect("A", "K1").await;
    let mut b = relay.connect("B", "K2").await;

    a.send(Message::Text("{not json".into())).await.unwrap();
    send_json(&mut a, json!({"type": "offer", "from": "A"})).await;
    send_json(&mut a, json!({"type": "ice_candidate", "from": "A", "to": "B"})).await;

    assert_eq!(
        next_json(&mut b).await,
        json!({"type": "ice_candidate", "from": "A", "to": "B"})
    );
    assert!(relay.registry.is_connected("A"));
    assert_eq!(
        relay.registry.metrics().decode_errors.load(Ordering::Relaxed),
        2
    );
}

#[tokio::test]
async fn second_connect_takes_over_identity() {
    let relay = Relay::start().await;
    let mut old = relay.connect("A", "K1").await;
    let mut new = relay.connect("A", "K1").await;
    let mut b = relay.connect("B", "K2").await;

    match tokio::time::timeout(Duration::from_secs(2), old.next()).await {
        Ok(Some(Ok(Message::Close(Some(close))))) => assert_eq!(u16::from(close.code), 4000),
        other => panic!("expected takeover close, got {other:?}"),
    }

    send_json(&mut b, json!({"type": "answer", "from": "B", "to": "A"})).await;
    assert_eq!(
        next_json(&mut new).await,
        json!({"type": "answer", "from": "B", "to": "A"})
    );

    // The replaced socket winding down must not deregister its successor.
    drop(old);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(relay.registry.is_connected("A"));
    assert_eq!(relay.registry.total_sessions(), 2);
}

#[tokio::test]
async fn changed_key_survives_restart_unchanged_key_is_not_rewritten() {
    let relay = Relay::start().await;

    let a = relay.connect("A", "K1").await;
    drop(a);
    let a = relay.connect("A", "K1").await;
    drop(a);
    assert_eq!(relay.registry.keys().writes(), 1);

    let _a = relay.connect("A", "K2").await;
    assert_eq!(relay.registry.keys().writes(), 2);

    let path = relay.dir.path().join("users.json");
    let reloaded = KeyStore::load(&path).expect("reload key file");
    assert_eq!(reloaded.get("A").as_deref(), Some("K2"));

    let restarted = Relay::start_in(relay.dir).await;
    let (status, body) = restarted.lookup_key("A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["public_identity_key"], "K2");
}
