//! Core types for the Talkbox chat relay.
//!
//! This crate is deliberately free of HTTP, async and filesystem
//! dependencies. It holds the record model, the identity derivation, the
//! command grammar and the bounded history buffer. The durable store and the
//! relay server depend on it.

pub mod command;
pub mod error;
pub mod history;
pub mod identity;
pub mod record;
pub mod store;

pub use error::{Error, Result};
