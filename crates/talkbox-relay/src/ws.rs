//! WebSocket transport: one task pair per connection.
//!
//! `GET {base}/ws` upgrades to a WebSocket. The connection joins the hub,
//! receives the current snapshot, then forwards inbound frames to the hub
//! while a separate send task relays broadcasts. Either side ending closes
//! the connection and it leaves the hub.

use std::{net::SocketAddr, time::Duration};

use axum::{
  body::Bytes,
  extract::{
    ConnectInfo, State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  http::{Extensions, HeaderMap},
  response::Response,
};
use futures_util::{
  SinkExt, StreamExt,
  stream::SplitSink,
};
use talkbox_core::identity::ConnectionIdentity;
use tokio::sync::broadcast::{
  self,
  error::{RecvError, TryRecvError},
};
use tracing::{debug, warn};

use crate::{
  AppState, Error, ServerConfig,
  hub::{ConnectionHub, Snapshot, Subscription},
  protocol::{ClientEvent, decode_client, encode_snapshot},
};

/// `GET {base}/ws`
pub async fn handler(
  State(state): State<AppState>,
  headers: HeaderMap,
  extensions: Extensions,
  ws: WebSocketUpgrade,
) -> Response {
  let peer = extensions
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| *addr);
  let origin = resolve_origin(&headers, peer, &state.config);
  let identity = ConnectionIdentity::new(origin.as_deref());
  let ping_every = Duration::from_secs(state.config.ping_interval_secs.max(1));

  ws.on_upgrade(move |socket| run_connection(socket, state.hub, identity, ping_every))
}

/// The origin address a connection's author id is derived from.
///
/// The configured header wins (first entry, for list-valued headers such as
/// `x-forwarded-for`); the TCP peer is used only when trusted.
pub fn resolve_origin(
  headers: &HeaderMap,
  peer: Option<SocketAddr>,
  config: &ServerConfig,
) -> Option<String> {
  let from_header = headers
    .get(config.origin_header.as_str())
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned);

  from_header.or_else(|| {
    peer
      .filter(|_| config.trust_peer_addr)
      .map(|addr| addr.ip().to_string())
  })
}

async fn run_connection(
  socket: WebSocket,
  hub: ConnectionHub,
  identity: ConnectionIdentity,
  ping_every: Duration,
) {
  let Subscription { snapshot, mut updates } = match hub.join(&identity).await {
    Ok(subscription) => subscription,
    Err(e) => {
      warn!(connection = %identity.connection_id, error = %e, "could not join hub");
      return;
    }
  };

  let (mut sink, mut stream) = socket.split();
  let connection_id = identity.connection_id;

  let mut send_task = tokio::spawn(async move {
    if send_snapshot(&mut sink, &snapshot).await.is_err() {
      return;
    }

    let mut ping = tokio::time::interval(ping_every);
    ping.tick().await;

    loop {
      tokio::select! {
        update = updates.recv() => match update {
          Ok(snapshot) => {
            if send_snapshot(&mut sink, &snapshot).await.is_err() {
              break;
            }
          }
          Err(RecvError::Lagged(skipped)) => {
            debug!(connection = %connection_id, skipped, "slow connection skipped snapshots");
            if let Some(snapshot) = newest_buffered(&mut updates)
              && send_snapshot(&mut sink, &snapshot).await.is_err()
            {
              break;
            }
          }
          Err(RecvError::Closed) => break,
        },
        _ = ping.tick() => {
          if sink.send(Message::Ping(Bytes::new())).await.is_err() {
            break;
          }
        }
      }
    }
    let _ = sink.close().await;
  });

  loop {
    tokio::select! {
      frame = stream.next() => match frame {
        Some(Ok(Message::Text(text))) => {
          if let Err(Error::HubClosed) = handle_text(&hub, &identity, text.as_str()).await {
            break;
          }
        }
        Some(Ok(Message::Binary(_))) => {
          debug!(connection = %connection_id, "discarding binary frame");
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          debug!(connection = %connection_id, error = %e, "websocket receive error");
          break;
        }
      },
      _ = &mut send_task => break,
    }
  }

  send_task.abort();
  hub.leave(&identity).await;
}

/// Decode one text frame and hand it to the hub. Malformed frames are logged
/// and dropped; only a stopped hub is reported back.
async fn handle_text(
  hub: &ConnectionHub,
  identity: &ConnectionIdentity,
  text: &str,
) -> Result<(), Error> {
  match decode_client(text) {
    Ok(ClientEvent::ChatMessage(message)) => hub.submit(identity, message).await,
    Err(e) => {
      debug!(connection = %identity.connection_id, error = %e, "discarding malformed frame");
      Ok(())
    }
  }
}

/// Drain every buffered update and return the newest one. Each snapshot is
/// the full history, so older ones are never worth sending.
fn newest_buffered(updates: &mut broadcast::Receiver<Snapshot>) -> Option<Snapshot> {
  let mut newest = None;
  loop {
    match updates.try_recv() {
      Ok(snapshot) => newest = Some(snapshot),
      Err(TryRecvError::Lagged(_)) => {}
      Err(TryRecvError::Empty | TryRecvError::Closed) => return newest,
    }
  }
}

async fn send_snapshot(
  sink: &mut SplitSink<WebSocket, Message>,
  snapshot: &Snapshot,
) -> Result<(), axum::Error> {
  let frame = match encode_snapshot(snapshot) {
    Ok(frame) => frame,
    Err(e) => {
      warn!(error = %e, "failed to encode snapshot");
      return Ok(());
    }
  };
  sink.send(Message::Text(frame.into())).await
}
