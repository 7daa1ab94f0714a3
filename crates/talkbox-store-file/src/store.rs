//! [`FileHistoryStore`]: the durable implementation of [`HistoryStore`].

use std::path::Path;

use talkbox_core::{
  history::History,
  record::{NewRecord, Record},
  store::HistoryStore,
};
use tracing::{info, warn};

use crate::{
  Error, Result,
  encode::read_image,
  sync::{SyncMonitor, SyncQueue},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A bounded chat history mirrored to a single JSON file.
///
/// Memory is authoritative. Every mutation schedules a rewrite of the file;
/// the file converges on the in-memory state once writes go quiet.
pub struct FileHistoryStore {
  history: History,
  sync:    SyncQueue,
}

impl FileHistoryStore {
  /// Load the image at `path`, or start empty.
  ///
  /// A missing, unreadable or corrupt file is logged and treated as an empty
  /// history, as is an image whose sequence numbers are exhausted; it never
  /// prevents startup. The only error is a zero `capacity`. Must be called
  /// inside a tokio runtime; the writer task is spawned here.
  pub async fn restore(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let empty = History::new(capacity)?;

    let loaded = read_image(&path).await.and_then(|image| {
      image
        .map(|image| History::from_image(image, capacity))
        .transpose()
        .map_err(Error::from)
    });

    let history = match loaded {
      Ok(Some(history)) => {
        info!(
          path = %path.display(),
          records = history.len(),
          next_sequence = history.next_sequence(),
          "restored chat history"
        );
        history
      }
      Ok(None) => {
        info!(path = %path.display(), "no history file; starting empty");
        empty
      }
      Err(e) => {
        warn!(
          path = %path.display(),
          error = %e,
          "could not restore history file; starting empty"
        );
        empty
      }
    };

    Ok(Self { history, sync: SyncQueue::spawn(path) })
  }

  /// A handle for waiting on the writer from other tasks.
  pub fn monitor(&self) -> SyncMonitor { self.sync.monitor() }

  /// Wait until the current state has been handed to the filesystem.
  pub async fn flush(&self) { self.monitor().flush().await }

  fn schedule_sync(&mut self) { self.sync.schedule(self.history.image()); }
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for FileHistoryStore {
  fn append(&mut self, record: NewRecord) -> Record {
    let record = self.history.push(record);
    self.schedule_sync();
    record
  }

  fn clear(&mut self) {
    self.history.truncate();
    self.schedule_sync();
  }

  fn snapshot(&self) -> Vec<Record> { self.history.snapshot() }

  fn capacity(&self) -> usize { self.history.capacity() }
}
