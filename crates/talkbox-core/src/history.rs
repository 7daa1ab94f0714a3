//! [`History`]: the bounded, insertion-ordered record buffer.
//!
//! Appending past capacity evicts the oldest live record. Sequence numbers
//! are assigned here and never reused, not even after [`History::clear`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{NewRecord, Record},
  store::HistoryStore,
};

/// First sequence number handed out by a fresh history.
pub const FIRST_SEQUENCE: u64 = 1;

/// The persisted layout of a history: the live records plus the next
/// sequence number to assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryImage {
  pub records:       Vec<Record>,
  pub next_sequence: u64,
}

/// A bounded FIFO of records. Also usable on its own as a volatile
/// [`HistoryStore`].
#[derive(Debug, Clone)]
pub struct History {
  records:       VecDeque<Record>,
  capacity:      usize,
  next_sequence: u64,
}

impl History {
  pub fn new(capacity: usize) -> Result<Self> {
    if capacity == 0 {
      return Err(Error::ZeroCapacity);
    }
    Ok(Self {
      records: VecDeque::with_capacity(capacity),
      capacity,
      next_sequence: FIRST_SEQUENCE,
    })
  }

  /// Rebuild a history from a persisted image.
  ///
  /// Records are put back in sequence order and only the newest `capacity`
  /// are kept. The next sequence is raised past every stored record so a
  /// hand-edited or stale image can never cause reuse. An image that leaves
  /// no room for another sequence is rejected with
  /// [`Error::SequenceExhausted`].
  pub fn from_image(image: HistoryImage, capacity: usize) -> Result<Self> {
    let mut history = Self::new(capacity)?;
    let mut records = image.records;
    records.sort_by_key(|r| r.sequence);
    records.dedup_by_key(|r| r.sequence);

    let floor = match records.last() {
      Some(r) => r
        .sequence
        .checked_add(1)
        .ok_or(Error::SequenceExhausted { highest: r.sequence })?,
      None => FIRST_SEQUENCE,
    };
    let next_sequence = image.next_sequence.max(floor);
    if next_sequence == u64::MAX {
      return Err(Error::SequenceExhausted { highest: next_sequence });
    }
    history.next_sequence = next_sequence;

    let skip = records.len().saturating_sub(capacity);
    history.records.extend(records.into_iter().skip(skip));
    Ok(history)
  }

  /// The current state in persisted form.
  pub fn image(&self) -> HistoryImage {
    HistoryImage {
      records:       self.records.iter().cloned().collect(),
      next_sequence: self.next_sequence,
    }
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn next_sequence(&self) -> u64 { self.next_sequence }

  /// Assign the next sequence to `input`, push it, and evict the head if the
  /// buffer overflowed. Returns a copy of the stored record.
  ///
  /// `next_sequence` stays below `u64::MAX` on every path into a history,
  /// so the counter saturates instead of wrapping.
  pub fn push(&mut self, input: NewRecord) -> Record {
    let record = input.into_record(self.next_sequence);
    self.next_sequence = self.next_sequence.saturating_add(1);
    if self.records.len() == self.capacity {
      self.records.pop_front();
    }
    self.records.push_back(record.clone());
    record
  }

  /// Drop every live record. Numbering continues where it left off.
  pub fn truncate(&mut self) { self.records.clear(); }
}

impl HistoryStore for History {
  fn append(&mut self, record: NewRecord) -> Record { self.push(record) }

  fn clear(&mut self) { self.truncate(); }

  fn snapshot(&self) -> Vec<Record> { self.records.iter().cloned().collect() }

  fn capacity(&self) -> usize { self.capacity }
}
