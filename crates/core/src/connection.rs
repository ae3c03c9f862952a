//! Per-socket session state.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::broadcast::topic_matches;

/// Identifier assigned to each accepted socket, unique within the process.
pub type ConnectionId = u64;

/// Why a notification could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError {
  Full,
  Closed,
}

/// Handle to one connected client. Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct Connection {
  inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
  id: ConnectionId,
  subscriptions: Mutex<BTreeSet<String>>,
  agent_id: Mutex<Option<String>>,
  tx: mpsc::Sender<String>,
}

impl Connection {
  pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
    Self {
      inner: Arc::new(Inner {
        id,
        subscriptions: Mutex::new(BTreeSet::new()),
        agent_id: Mutex::new(None),
        tx,
      }),
    }
  }

  /// Create a connection plus the receiving end its writer task drains.
  pub fn channel(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Self::new(id, tx), rx)
  }

  pub fn id(&self) -> ConnectionId {
    self.inner.id
  }

  pub fn linked_agent_id(&self) -> Option<String> {
    self.inner.agent_id.lock().clone()
  }

  pub fn link_agent(&self, agent_id: impl Into<String>) {
    *self.inner.agent_id.lock() = Some(agent_id.into());
  }

  /// Current subscription patterns, sorted.
  pub fn subscriptions(&self) -> Vec<String> {
    self.inner.subscriptions.lock().iter().cloned().collect()
  }

  /// Returns true if the pattern was newly added.
  pub fn subscribe(&self, pattern: impl Into<String>) -> bool {
    self.inner.subscriptions.lock().insert(pattern.into())
  }

  /// Returns true if the pattern was present.
  pub fn unsubscribe(&self, pattern: &str) -> bool {
    self.inner.subscriptions.lock().remove(pattern)
  }

  pub fn is_subscribed_to(&self, topic: &str) -> bool {
    self
      .inner
      .subscriptions
      .lock()
      .iter()
      .any(|pattern| topic_matches(pattern, topic))
  }

  /// Queue a line without waiting; used for fire-and-forget notifications.
  pub fn try_send_line(&self, line: String) -> Result<(), TrySendError> {
    self.inner.tx.try_send(line).map_err(|e| match e {
      mpsc::error::TrySendError::Full(_) => TrySendError::Full,
      mpsc::error::TrySendError::Closed(_) => TrySendError::Closed,
    })
  }

  /// Queue a line, waiting for room. Returns false once the writer is gone.
  pub async fn send_line(&self, line: String) -> bool {
    self.inner.tx.send(line).await.is_ok()
  }
}
