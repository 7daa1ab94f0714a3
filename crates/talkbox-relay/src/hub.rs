//! The connection hub: one task that owns the history and serialises every
//! mutation.
//!
//! Connections talk to the hub through a cloneable [`ConnectionHub`] handle.
//! Joins, leaves, inbound messages and snapshot reads all travel through one
//! queue and are handled one at a time, so sequence assignment, eviction and
//! clearing never interleave. Fresh snapshots fan out over a broadcast
//! channel; each connection forwards them from its own task, so a slow peer
//! only delays itself.

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use talkbox_core::{
  command::{Interpretation, interpret},
  identity::ConnectionIdentity,
  record::{InboundMessage, NewRecord, Record},
  store::HistoryStore,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

/// The live history, shared between all receivers of one broadcast.
pub type Snapshot = Arc<[Record]>;

/// Snapshots retained for lagging connections. Each snapshot is the full
/// state, so a connection that falls further behind just skips ahead.
const BROADCAST_CAPACITY: usize = 16;

/// What a connection gets when it opens.
pub struct Subscription {
  /// The history at the moment of joining, for this connection only.
  pub snapshot: Snapshot,
  /// Every snapshot broadcast after `snapshot`.
  pub updates:  broadcast::Receiver<Snapshot>,
}

enum HubCommand {
  Join {
    identity: ConnectionIdentity,
    reply:    oneshot::Sender<Subscription>,
  },
  Leave {
    identity: ConnectionIdentity,
  },
  Inbound {
    connection_id: Uuid,
    draft:         NewRecord,
  },
  Snapshot {
    reply: oneshot::Sender<Snapshot>,
  },
  Shutdown {
    reply: oneshot::Sender<()>,
  },
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct ConnectionHub {
  commands: mpsc::Sender<HubCommand>,
  open:     Arc<AtomicUsize>,
}

impl ConnectionHub {
  /// Move `store` into a new processing task and return a handle to it.
  /// `queue_depth` bounds the number of commands waiting to be processed.
  pub fn spawn<S: HistoryStore>(store: S, queue_depth: usize) -> Self {
    let (commands, rx) = mpsc::channel(queue_depth.max(1));
    let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
    let open = Arc::new(AtomicUsize::new(0));

    let worker = HubWorker {
      store,
      updates,
      connections: HashSet::new(),
      open: open.clone(),
    };
    tokio::spawn(worker.run(rx));

    Self { commands, open }
  }

  /// Register an opening connection. The returned snapshot is meant for this
  /// connection alone; the receiver yields every later broadcast.
  pub async fn join(&self, identity: &ConnectionIdentity) -> Result<Subscription> {
    let (reply, rx) = oneshot::channel();
    self
      .send(HubCommand::Join { identity: identity.clone(), reply })
      .await?;
    rx.await.map_err(|_| Error::HubClosed)
  }

  /// Queue an inbound message from `identity`. The author id is always taken
  /// from the identity, and the receive time is stamped here.
  pub async fn submit(
    &self,
    identity: &ConnectionIdentity,
    message: InboundMessage,
  ) -> Result<()> {
    let draft = message.into_draft(identity.author_id.clone());
    self
      .send(HubCommand::Inbound { connection_id: identity.connection_id, draft })
      .await
  }

  /// Mark a connection closed. Does not trigger a broadcast.
  pub async fn leave(&self, identity: &ConnectionIdentity) {
    let _ = self
      .send(HubCommand::Leave { identity: identity.clone() })
      .await;
  }

  /// The current history, read through the processing task.
  pub async fn snapshot(&self) -> Result<Snapshot> {
    let (reply, rx) = oneshot::channel();
    self.send(HubCommand::Snapshot { reply }).await?;
    rx.await.map_err(|_| Error::HubClosed)
  }

  /// Stop the processing task. Commands queued before this one are still
  /// handled; the store is dropped once the task exits.
  pub async fn shutdown(&self) {
    let (reply, rx) = oneshot::channel();
    if self.send(HubCommand::Shutdown { reply }).await.is_ok() {
      let _ = rx.await;
    }
  }

  pub fn open_connections(&self) -> usize { self.open.load(Ordering::Relaxed) }

  async fn send(&self, command: HubCommand) -> Result<()> {
    self.commands.send(command).await.map_err(|_| Error::HubClosed)
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

struct HubWorker<S> {
  store:       S,
  updates:     broadcast::Sender<Snapshot>,
  connections: HashSet<Uuid>,
  open:        Arc<AtomicUsize>,
}

impl<S: HistoryStore> HubWorker<S> {
  async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
    info!(capacity = self.store.capacity(), "connection hub started");
    while let Some(command) = rx.recv().await {
      match command {
        HubCommand::Join { identity, reply } => self.join(identity, reply),
        HubCommand::Leave { identity } => self.leave(identity),
        HubCommand::Inbound { connection_id, draft } => {
          self.process(connection_id, draft)
        }
        HubCommand::Snapshot { reply } => {
          let _ = reply.send(self.snapshot());
        }
        HubCommand::Shutdown { reply } => {
          let _ = reply.send(());
          break;
        }
      }
    }
    info!("connection hub stopped");
  }

  fn snapshot(&self) -> Snapshot { Snapshot::from(self.store.snapshot()) }

  fn join(
    &mut self,
    identity: ConnectionIdentity,
    reply: oneshot::Sender<Subscription>,
  ) {
    // Subscribing in the same step as taking the snapshot means nothing can
    // be broadcast in between.
    let subscription = Subscription {
      snapshot: self.snapshot(),
      updates:  self.updates.subscribe(),
    };
    self.connections.insert(identity.connection_id);
    if reply.send(subscription).is_err() {
      debug!(connection = %identity.connection_id, "connection gone before join completed");
      self.connections.remove(&identity.connection_id);
      return;
    }

    self.open.store(self.connections.len(), Ordering::Relaxed);
    info!(
      user_id = %identity.author_id,
      origin = %identity.origin,
      connection = %identity.connection_id,
      open = self.connections.len(),
      "connected"
    );
  }

  fn leave(&mut self, identity: ConnectionIdentity) {
    if !self.connections.remove(&identity.connection_id) {
      return;
    }
    self.open.store(self.connections.len(), Ordering::Relaxed);
    info!(
      user_id = %identity.author_id,
      origin = %identity.origin,
      connection = %identity.connection_id,
      open = self.connections.len(),
      "disconnected"
    );
  }

  fn process(&mut self, connection_id: Uuid, draft: NewRecord) {
    debug!(
      connection = %connection_id,
      user_id = %draft.author_id,
      username = %draft.author_name,
      body = %draft.body,
      "inbound message"
    );

    match interpret(draft) {
      Interpretation::Chat(record) => {
        self.store.append(record);
      }
      Interpretation::System { record, clears_history } => {
        if clears_history {
          self.store.clear();
        }
        self.store.append(record);
      }
      Interpretation::Unrecognized(command) => {
        info!(connection = %connection_id, %command, "ignoring unknown command");
        return;
      }
    }

    // No receivers just means nobody is connected.
    let _ = self.updates.send(self.snapshot());
  }
}
