//! Advisory locks over caller-named resources.
//!
//! Locks live only in memory; a daemon restart releases everything. Waiting
//! for a contended resource is bounded polling with async sleeps so no
//! runtime thread is ever parked on a held lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
  pub lock_id: String,
  pub resource: String,
  pub holder: String,
  pub acquired_at: DateTime<Utc>,
}

/// Outcome of a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
  /// Created by this call.
  Granted(Lock),
  /// The caller already held it.
  AlreadyHeld(Lock),
}

impl Acquisition {
  pub fn is_new(&self) -> bool {
    matches!(self, Acquisition::Granted(_))
  }

  pub fn lock(&self) -> &Lock {
    match self {
      Acquisition::Granted(lock) | Acquisition::AlreadyHeld(lock) => lock,
    }
  }

  pub fn into_lock(self) -> Lock {
    match self {
      Acquisition::Granted(lock) | Acquisition::AlreadyHeld(lock) => lock,
    }
  }
}

#[derive(Debug, Default)]
pub struct LockManager {
  by_resource: HashMap<String, Lock>,
  resource_by_id: HashMap<String, String>,
}

impl LockManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Single non-blocking attempt. Re-acquiring a lock already held by
  /// `agent_id` returns the existing lock as `AlreadyHeld`.
  pub fn try_acquire(&mut self, agent_id: &str, resource: &str) -> Option<Acquisition> {
    if let Some(existing) = self.by_resource.get(resource) {
      if existing.holder == agent_id {
        return Some(Acquisition::AlreadyHeld(existing.clone()));
      }
      return None;
    }
    let mut lock_id = Uuid::new_v4().to_string();
    while self.resource_by_id.contains_key(&lock_id) {
      lock_id = Uuid::new_v4().to_string();
    }
    let lock = Lock {
      lock_id: lock_id.clone(),
      resource: resource.to_string(),
      holder: agent_id.to_string(),
      acquired_at: Utc::now(),
    };
    self.resource_by_id.insert(lock_id, resource.to_string());
    self.by_resource.insert(resource.to_string(), lock.clone());
    info!(event = "lock_acquired", lock_id = %lock.lock_id, resource, holder = agent_id, "lock acquired");
    Some(Acquisition::Granted(lock))
  }

  /// Release by id; `None` if unknown or already released.
  pub fn release(&mut self, lock_id: &str) -> Option<Lock> {
    let resource = self.resource_by_id.remove(lock_id)?;
    let lock = self.by_resource.remove(&resource)?;
    info!(event = "lock_released", lock_id, resource = %lock.resource, holder = %lock.holder, "lock released");
    Some(lock)
  }

  /// Drop every lock held by `agent_id`.
  pub fn release_all_for(&mut self, agent_id: &str) -> Vec<Lock> {
    let ids: Vec<String> = self
      .by_resource
      .values()
      .filter(|l| l.holder == agent_id)
      .map(|l| l.lock_id.clone())
      .collect();
    ids.iter().filter_map(|id| self.release(id)).collect()
  }

  pub fn holder_of(&self, resource: &str) -> Option<&str> {
    self.by_resource.get(resource).map(|l| l.holder.as_str())
  }

  /// All live locks ordered by resource name.
  pub fn list(&self) -> Vec<Lock> {
    let mut locks: Vec<Lock> = self.by_resource.values().cloned().collect();
    locks.sort_by(|a, b| a.resource.cmp(&b.resource));
    locks
  }

  pub fn len(&self) -> usize {
    self.by_resource.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_resource.is_empty()
  }
}

/// Try to acquire `resource`, polling every `poll` until `timeout` elapses.
/// A zero timeout is a single attempt. The mutex is never held across a sleep.
pub async fn acquire_with_timeout(
  locks: &Mutex<LockManager>,
  agent_id: &str,
  resource: &str,
  timeout: Duration,
  poll: Duration,
) -> Option<Acquisition> {
  let deadline = Instant::now() + timeout;
  loop {
    if let Some(acquired) = locks.lock().try_acquire(agent_id, resource) {
      return Some(acquired);
    }
    let now = Instant::now();
    if now >= deadline {
      debug!(event = "lock_contended", resource, agent_id, "lock not acquired before timeout");
      return None;
    }
    tokio::time::sleep(poll.min(deadline - now)).await;
  }
}
