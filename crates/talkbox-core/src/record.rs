//! Record types: the unit of chat history.
//!
//! A record is either user-authored chat or a system notice synthesised from
//! a command. Records are created by the hub as [`NewRecord`] drafts and
//! become [`Record`]s once a store assigns them a sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::AuthorId;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Distinguishes plain chat from system-generated notices. A record carries
/// exactly one kind.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
  #[default]
  Chat,
  /// Emitted by `$_`; the history was truncated just before it.
  Clear,
  /// Emitted by `$b`.
  Alert,
  /// Emitted by `$e<argument>`.
  Emote,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A chat entry as held by a store and sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  /// Store-assigned; strictly increasing and never reused.
  pub sequence:         u64,
  pub author_name:      String,
  pub author_id:        AuthorId,
  pub body:             String,
  pub kind:             RecordKind,
  /// When the hub received the inbound message.
  pub created_at:       DateTime<Utc>,
  /// Timestamp supplied by the sending client. Display only; never used for
  /// ordering.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_timestamp: Option<f64>,
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::HistoryStore::append`].
/// `sequence` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
  pub author_name:      String,
  pub author_id:        AuthorId,
  pub body:             String,
  pub kind:             RecordKind,
  pub created_at:       DateTime<Utc>,
  pub client_timestamp: Option<f64>,
}

impl NewRecord {
  /// A plain chat draft stamped with the current time. The author name is
  /// trimmed; nothing else is validated.
  pub fn chat(
    author_name: &str,
    author_id: AuthorId,
    body: impl Into<String>,
  ) -> Self {
    Self {
      author_name: author_name.trim().to_owned(),
      author_id,
      body: body.into(),
      kind: RecordKind::Chat,
      created_at: Utc::now(),
      client_timestamp: None,
    }
  }

  pub fn with_client_timestamp(mut self, timestamp: Option<f64>) -> Self {
    self.client_timestamp = timestamp;
    self
  }

  /// Attach a store-assigned sequence number.
  pub fn into_record(self, sequence: u64) -> Record {
    Record {
      sequence,
      author_name: self.author_name,
      author_id: self.author_id,
      body: self.body,
      kind: self.kind,
      created_at: self.created_at,
      client_timestamp: self.client_timestamp,
    }
  }
}

// ─── Inbound wire shape ──────────────────────────────────────────────────────

/// The payload a client sends with a `chat message` event.
///
/// Any `userId` the client includes is ignored; the author id always comes
/// from the server-side connection identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
  pub username:  String,
  pub message:   String,
  #[serde(default)]
  pub timestamp: Option<f64>,
}

impl InboundMessage {
  /// Build the draft for this message on behalf of `author_id`.
  pub fn into_draft(self, author_id: AuthorId) -> NewRecord {
    NewRecord::chat(&self.username, author_id, self.message)
      .with_client_timestamp(self.timestamp)
  }
}
