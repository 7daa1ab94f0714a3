//! The coalescing writer.
//!
//! Each store owns one writer task, so at most one write to the image file is
//! in flight. Requests go through a single-slot `watch` channel: a request
//! made while a write is running replaces any request still waiting, and the
//! writer picks up only the newest image once it is free.

use std::{path::PathBuf, sync::Arc};

use talkbox_core::history::HistoryImage;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::encode::write_image;

/// The newest requested image, tagged with a generation number.
type Pending = Option<(u64, Arc<HistoryImage>)>;

/// Write side, held by the store.
pub(crate) struct SyncQueue {
  pending:    watch::Sender<Pending>,
  written:    watch::Receiver<u64>,
  generation: u64,
}

impl SyncQueue {
  /// Spawn the writer task for `path`. Must be called inside a tokio runtime.
  pub(crate) fn spawn(path: PathBuf) -> Self {
    let (pending_tx, pending_rx) = watch::channel::<Pending>(None);
    let (written_tx, written_rx) = watch::channel(0u64);
    tokio::spawn(run_writer(path, pending_rx, written_tx));
    Self { pending: pending_tx, written: written_rx, generation: 0 }
  }

  /// Request that `image` be written. Never waits.
  pub(crate) fn schedule(&mut self, image: HistoryImage) {
    self.generation += 1;
    self.pending.send_replace(Some((self.generation, Arc::new(image))));
  }

  pub(crate) fn monitor(&self) -> SyncMonitor {
    SyncMonitor {
      pending: self.pending.subscribe(),
      written: self.written.clone(),
    }
  }
}

async fn run_writer(
  path: PathBuf,
  mut pending: watch::Receiver<Pending>,
  written: watch::Sender<u64>,
) {
  // `changed` still yields a value sent just before the sender was dropped,
  // so the final image is written before the loop ends.
  while pending.changed().await.is_ok() {
    let Some((generation, image)) = pending.borrow_and_update().clone() else {
      continue;
    };

    match write_image(&path, &image).await {
      Ok(()) => debug!(
        path = %path.display(),
        generation,
        records = image.records.len(),
        "history image written"
      ),
      Err(e) => warn!(
        path = %path.display(),
        generation,
        error = %e,
        "failed to write history image; keeping in-memory state"
      ),
    }
    written.send_replace(generation);
  }
  debug!(path = %path.display(), "history writer stopped");
}

// ─── Monitor ─────────────────────────────────────────────────────────────────

/// Observes a store's writer from outside the task that owns the store.
#[derive(Clone)]
pub struct SyncMonitor {
  pending: watch::Receiver<Pending>,
  written: watch::Receiver<u64>,
}

impl SyncMonitor {
  /// Wait until the newest image requested so far has been written, or its
  /// write attempt has failed. Returns immediately if the writer is gone.
  pub async fn flush(&self) {
    let target = self
      .pending
      .borrow()
      .as_ref()
      .map(|(generation, _)| *generation)
      .unwrap_or(0);
    let mut written = self.written.clone();
    let _ = written.wait_for(|done| *done >= target).await;
  }

  /// Wait until the writer task has exited. This happens after the owning
  /// store is dropped and the last pending image has been handled.
  pub async fn closed(&self) {
    let mut written = self.written.clone();
    while written.changed().await.is_ok() {}
  }
}
