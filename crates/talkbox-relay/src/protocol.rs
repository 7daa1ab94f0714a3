//! WebSocket frame shapes.
//!
//! Every frame is a JSON text frame carrying an event envelope:
//! `{"event": "chat message", "data": ...}`. Clients send an
//! [`InboundMessage`]; the server answers with the full history.

use serde::{Deserialize, Serialize};
use talkbox_core::record::{InboundMessage, Record};

/// The single event name used in both directions.
pub const CHAT_EVENT: &str = "chat message";

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
  #[serde(rename = "chat message")]
  ChatMessage(InboundMessage),
}

/// Server → client.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent<'a> {
  /// The live history, ascending by sequence.
  #[serde(rename = "chat message")]
  ChatMessage(&'a [Record]),
}

pub fn decode_client(text: &str) -> serde_json::Result<ClientEvent> {
  serde_json::from_str(text)
}

pub fn encode_snapshot(records: &[Record]) -> serde_json::Result<String> {
  serde_json::to_string(&ServerEvent::ChatMessage(records))
}
