//! Read-only JSON endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `{base}/api/history` | Current snapshot, ascending by sequence |
//! | `GET`  | `{base}/api/health`  | Liveness plus open connection count |

use axum::{Json, extract::State};
use serde::Serialize;
use talkbox_core::record::Record;

use crate::{AppState, Error};

/// `GET {base}/api/history`
pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<Record>>, Error> {
  let snapshot = state.hub.snapshot().await?;
  Ok(Json(snapshot.to_vec()))
}

#[derive(Debug, Serialize)]
pub struct Health {
  pub status:      &'static str,
  pub connections: usize,
}

/// `GET {base}/api/health`
pub async fn health(State(state): State<AppState>) -> Json<Health> {
  Json(Health { status: "ok", connections: state.hub.open_connections() })
}
