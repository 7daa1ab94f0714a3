//! Real-time chat relay for Talkbox.
//!
//! Exposes an axum [`Router`] serving the chat WebSocket and a small JSON
//! API, backed by a [`ConnectionHub`] that owns any
//! [`talkbox_core::store::HistoryStore`].

pub mod api;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod ws;

pub use error::{Error, Result};
pub use hub::ConnectionHub;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TALKBOX_*` environment variables. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  /// Path prefix all routes are mounted under.
  pub base_path:          String,
  /// The JSON image the history is mirrored to.
  pub history_path:       PathBuf,
  /// Maximum number of live records.
  pub capacity:           usize,
  /// Request header holding the client address, as set by a fronting proxy.
  pub origin_header:      String,
  /// Fall back to the TCP peer address when the header is absent.
  pub trust_peer_addr:    bool,
  /// Directory of static client assets served under `base_path`.
  pub static_dir:         Option<PathBuf>,
  pub ping_interval_secs: u64,
  /// Commands that may wait for the hub before senders are held back.
  pub hub_queue_depth:    usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "0.0.0.0".to_string(),
      port:               3000,
      base_path:          "/talkbox".to_string(),
      history_path:       PathBuf::from("chatBuffer.json"),
      capacity:           100,
      origin_header:      "cf-connecting-ip".to_string(),
      trust_peer_addr:    false,
      static_dir:         None,
      ping_interval_secs: 30,
      hub_queue_depth:    1024,
    }
  }
}

impl ServerConfig {
  /// `base_path` with a leading slash and no trailing slash; empty for root.
  pub fn mount_path(&self) -> String {
    let trimmed = self.base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
      String::new()
    } else {
      format!("/{trimmed}")
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub hub:    ConnectionHub,
  pub config: Arc<ServerConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the relay [`Router`].
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` when
/// `trust_peer_addr` is enabled; otherwise the peer address is never read.
pub fn router(state: AppState) -> Router {
  let mount = state.config.mount_path();
  let static_dir = state.config.static_dir.clone();

  let mut routes = Router::new()
    .route("/ws",          get(ws::handler))
    .route("/api/history", get(api::history))
    .route("/api/health",  get(api::health));

  if let Some(dir) = static_dir {
    routes = routes.fallback_service(ServeDir::new(dir));
  }

  let app = if mount.is_empty() {
    routes
  } else {
    Router::new().nest(&mount, routes)
  };

  app.layer(TraceLayer::new_for_http()).with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use std::{net::SocketAddr, time::Duration};

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use futures_util::{SinkExt, StreamExt};
  use talkbox_core::{history::History, identity::AuthorId};
  use tokio::net::TcpListener;
  use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest},
  };
  use tower::ServiceExt as _;

  type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

  fn make_state(config: ServerConfig) -> AppState {
    let history = History::new(config.capacity).unwrap();
    AppState {
      hub:    ConnectionHub::spawn(history, config.hub_queue_depth),
      config: Arc::new(config),
    }
  }

  async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let req  = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
  }

  async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
  }

  async fn connect(addr: SocketAddr, origin: &str) -> Client {
    let mut req = format!("ws://{addr}/talkbox/ws").into_client_request().unwrap();
    req.headers_mut().insert("cf-connecting-ip", origin.parse().unwrap());
    let (client, _) = connect_async(req).await.unwrap();
    client
  }

  async fn send(client: &mut Client, username: &str, message: &str) {
    let frame = serde_json::json!({
      "event": "chat message",
      "data": { "username": username, "message": message, "timestamp": 1 },
    });
    client.send(Message::text(frame.to_string())).await.unwrap();
  }

  /// The `data` array of the next snapshot frame, skipping control frames.
  async fn next_snapshot(client: &mut Client) -> Vec<serde_json::Value> {
    loop {
      let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("frame within timeout")
        .expect("stream open")
        .expect("valid frame");
      if let Message::Text(text) = msg {
        let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(frame["event"], "chat message");
        return frame["data"].as_array().unwrap().clone();
      }
    }
  }

  // ── HTTP ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn history_starts_empty() {
    let state = make_state(ServerConfig::default());
    let (status, json) = get_json(state, "/talkbox/api/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
  }

  #[tokio::test]
  async fn health_reports_connections() {
    let state = make_state(ServerConfig::default());
    let (status, json) = get_json(state, "/talkbox/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
  }

  #[tokio::test]
  async fn routes_follow_base_path() {
    let state = make_state(ServerConfig { base_path: "/".into(), ..Default::default() });
    let (status, _) = get_json(state.clone(), "/api/history").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(state, "/talkbox/api/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn stopped_hub_returns_503() {
    let state = make_state(ServerConfig::default());
    state.hub.shutdown().await;
    let (status, json) = get_json(state, "/talkbox/api/history").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("hub"));
  }

  #[test]
  fn mount_path_normalisation() {
    let with = |base: &str| ServerConfig { base_path: base.into(), ..Default::default() };
    assert_eq!(with("/talkbox").mount_path(), "/talkbox");
    assert_eq!(with("talkbox/").mount_path(), "/talkbox");
    assert_eq!(with("/").mount_path(), "");
    assert_eq!(with("").mount_path(), "");
  }

  // ── WebSocket ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn websocket_relay_end_to_end() {
    let state = make_state(ServerConfig::default());
    let addr  = serve(state.clone()).await;

    let mut ann = connect(addr, "203.0.113.5").await;
    assert!(next_snapshot(&mut ann).await.is_empty());

    send(&mut ann, "Ann", "hello").await;
    let snap = next_snapshot(&mut ann).await;
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0]["body"], "hello");
    assert_eq!(
      snap[0]["authorId"],
      AuthorId::derive(Some("203.0.113.5")).as_str()
    );

    // A newcomer gets the current history on its own.
    let mut bob = connect(addr, "203.0.113.6").await;
    assert_eq!(next_snapshot(&mut bob).await.len(), 1);

    // Clearing is seen by everyone and leaves only the notice.
    send(&mut bob, "Bob", "$_").await;
    for client in [&mut ann, &mut bob] {
      let snap = next_snapshot(client).await;
      assert_eq!(snap.len(), 1);
      assert_eq!(snap[0]["kind"], "clear");
      assert_eq!(snap[0]["authorName"], "Bob");
    }

    // Garbage and unknown commands produce no broadcast at all.
    bob.send(Message::text("{not json")).await.unwrap();
    send(&mut bob, "Bob", "$z").await;
    send(&mut bob, "Bob", "after").await;
    let snap = next_snapshot(&mut ann).await;
    assert_eq!(snap.len(), 2);
    assert_eq!(snap[1]["body"], "after");

    assert_eq!(state.hub.open_connections(), 2);
  }

  #[tokio::test]
  async fn closing_a_client_leaves_the_hub() {
    let state = make_state(ServerConfig::default());
    let addr  = serve(state.clone()).await;

    let mut ann = connect(addr, "203.0.113.5").await;
    next_snapshot(&mut ann).await;
    assert_eq!(state.hub.open_connections(), 1);

    ann.close(None).await.unwrap();
    drop(ann);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.hub.open_connections() != 0 {
      assert!(tokio::time::Instant::now() < deadline, "connection never left");
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  }
}
