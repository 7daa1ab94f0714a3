//! File-backed durable history for the Talkbox relay.
//!
//! The live history is held in memory; every mutation schedules a rewrite of
//! a single JSON image file. Writes run on a dedicated writer task and are
//! coalesced so only the newest image is ever waiting to be written.

mod encode;
mod store;
mod sync;

pub mod error;

pub use error::{Error, Result};
pub use store::FileHistoryStore;
pub use sync::SyncMonitor;
