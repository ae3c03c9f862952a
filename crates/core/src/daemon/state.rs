use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::adapters::fs::StoreError;
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::locks::{Lock, LockManager};
use crate::queue::CommandQueue;
use crate::registry::{Agent, AgentRegistry};

use super::api::topics;

/// Everything the built-in methods share. Each component has its own mutex and
/// no method holds two of them at once.
#[derive(Debug)]
pub struct DaemonState {
  pub registry: Mutex<AgentRegistry>,
  pub queue: Mutex<CommandQueue>,
  pub locks: Mutex<LockManager>,
  pub broadcaster: Broadcaster,
  pub config: Config,
  pub socket_path: PathBuf,
  shutdown_tx: watch::Sender<bool>,
}

impl DaemonState {
  /// Load persisted agents and commands from `state_dir`.
  pub fn open(state_dir: &Path, config: Config, socket_path: PathBuf) -> Result<Self, StoreError> {
    let registry = AgentRegistry::open(state_dir)?;
    let queue = CommandQueue::open(state_dir)?;
    Ok(Self::with_parts(registry, queue, config, socket_path))
  }

  pub fn in_memory(config: Config) -> Self {
    Self::with_parts(
      AgentRegistry::in_memory(),
      CommandQueue::in_memory(),
      config,
      PathBuf::new(),
    )
  }

  fn with_parts(
    registry: AgentRegistry,
    queue: CommandQueue,
    config: Config,
    socket_path: PathBuf,
  ) -> Self {
    let (shutdown_tx, _) = watch::channel(false);
    Self {
      registry: Mutex::new(registry),
      queue: Mutex::new(queue),
      locks: Mutex::new(LockManager::new()),
      broadcaster: Broadcaster::new(),
      config,
      socket_path,
      shutdown_tx,
    }
  }

  pub fn request_shutdown(&self) {
    let _ = self.shutdown_tx.send(true);
  }

  pub fn shutdown_requested(&self) -> watch::Receiver<bool> {
    self.shutdown_tx.subscribe()
  }

  /// Clamp a client-supplied wait in seconds to `[0, max_lock_wait_secs]`.
  pub fn lock_wait(&self, secs: f64) -> Duration {
    clamp_secs(secs, self.config.max_lock_wait())
  }

  /// Release every lock held by `agent_id` and announce each release.
  pub fn release_locks_of(&self, agent_id: &str) -> Vec<Lock> {
    let released = self.locks.lock().release_all_for(agent_id);
    for lock in &released {
      self.broadcaster.broadcast(topics::LOCK_RELEASED, json!(lock));
    }
    released
  }

  /// Evict agents silent for longer than `timeout`, dropping their locks.
  pub fn evict_stale(&self, timeout: Duration) -> Vec<Agent> {
    let evicted = self.registry.lock().cleanup_stale(timeout);
    for agent in &evicted {
      self.release_locks_of(&agent.agent_id);
      self.broadcaster.broadcast(topics::AGENT_EVICTED, json!(agent));
    }
    if !evicted.is_empty() {
      info!(event = "agents_evicted", count = evicted.len(), timeout_secs = timeout.as_secs_f64(), "stale agents evicted");
    }
    evicted
  }
}

/// Client-supplied seconds as a duration within `[0, max]`. NaN and negative
/// values are zero; anything too large for `Duration` is `max`.
pub(crate) fn clamp_secs(secs: f64, max: Duration) -> Duration {
  if secs.is_nan() || secs <= 0.0 {
    return Duration::ZERO;
  }
  Duration::try_from_secs_f64(secs).map_or(max, |d| d.min(max))
}
