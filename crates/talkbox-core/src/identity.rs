//! Pseudonymous author ids derived from a connection's origin address.
//!
//! The id is the hex SHA-256 of the origin string. It is stable for an
//! origin, not a secret, and never used for authorisation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Origin used when a connection carries no usable address.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Fixed-length opaque author identifier (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
  /// Derive the id for `origin`. Absent or blank origins all map to the id
  /// of [`UNKNOWN_ORIGIN`].
  pub fn derive(origin: Option<&str>) -> Self {
    let origin = normalise_origin(origin);
    let hash = Sha256::digest(origin.as_bytes());
    Self(hex::encode(hash))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AuthorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn normalise_origin(origin: Option<&str>) -> &str {
  match origin.map(str::trim) {
    Some(o) if !o.is_empty() => o,
    _ => UNKNOWN_ORIGIN,
  }
}

// ─── ConnectionIdentity ──────────────────────────────────────────────────────

/// The identity of one open connection. Dropped when the connection closes;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
  /// Random per-connection id, used only to correlate log lines.
  pub connection_id: Uuid,
  /// The raw origin address, or [`UNKNOWN_ORIGIN`].
  pub origin:        String,
  pub author_id:     AuthorId,
}

impl ConnectionIdentity {
  pub fn new(origin: Option<&str>) -> Self {
    Self {
      connection_id: Uuid::new_v4(),
      origin:        normalise_origin(origin).to_owned(),
      author_id:     AuthorId::derive(origin),
    }
  }
}
