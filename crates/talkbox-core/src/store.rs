//! The `HistoryStore` trait.
//!
//! Implemented by [`crate::history::History`] (volatile) and by the durable
//! file store in `talkbox-store-file`. The relay's hub depends on this
//! abstraction, not on any concrete backend.
//!
//! A store is owned by exactly one processing task, so mutation takes
//! `&mut self` and no method blocks on I/O: durable backends schedule their
//! writes and return immediately.

use crate::record::{NewRecord, Record};

pub trait HistoryStore: Send + 'static {
  /// Assign the next sequence to `record`, insert it at the tail and evict
  /// the head if capacity is exceeded. Returns the stored record.
  fn append(&mut self, record: NewRecord) -> Record;

  /// Discard every live record. Sequence numbering is not reset.
  fn clear(&mut self);

  /// All live records in ascending sequence order.
  fn snapshot(&self) -> Vec<Record>;

  /// Maximum number of live records.
  fn capacity(&self) -> usize;
}
