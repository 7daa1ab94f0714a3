//! Error types for `talkbox-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("history capacity must be at least 1")]
  ZeroCapacity,

  /// A persisted image has used up the sequence space; no further record
  /// could be numbered without reuse.
  #[error("sequence numbers exhausted (highest {highest})")]
  SequenceExhausted { highest: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
