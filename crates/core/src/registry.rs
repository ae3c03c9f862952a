//! Agent presence registry.
//!
//! Each registered agent is persisted as `agents/<agent_id>.json` under the
//! state directory so presence survives a daemon restart. Stale agents (no
//! heartbeat within a timeout) are evicted by `cleanup_stale`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::fs::{self as fsutil, StoreError};
use crate::error::CoordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
  #[default]
  Active,
  Busy,
  Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
  pub agent_id: String,
  pub name: String,
  pub agent_type: String,
  pub status: AgentStatus,
  #[serde(default)]
  pub current_task: Option<String>,
  #[serde(default)]
  pub metadata: Map<String, Value>,
  pub registered_at: DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
}

impl Agent {
  /// True when the agent has not been seen for longer than `timeout` as of `now`.
  pub fn is_stale_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
    (now - self.last_seen)
      .to_std()
      .map(|age| age > timeout)
      .unwrap_or(false)
  }
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
  agents: HashMap<String, Agent>,
  state_dir: Option<PathBuf>,
}

impl AgentRegistry {
  /// Registry without persistence.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Load every presence record under `state_dir/agents`. Unreadable records are skipped.
  pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
    let dir = fsutil::agents_dir(state_dir);
    let mut agents = HashMap::new();
    if dir.exists() {
      let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
        path: dir.clone(),
        source,
      })?;
      for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
          continue;
        }
        match fsutil::read_json::<Agent>(&path) {
          Ok(Some(agent)) => {
            agents.insert(agent.agent_id.clone(), agent);
          }
          Ok(None) => {}
          Err(error) => {
            warn!(event = "agent_record_skipped", path = %path.display(), error = %error, "failed to load agent record");
          }
        }
      }
    }
    info!(event = "agent_registry_loaded", count = agents.len(), dir = %dir.display(), "agent registry loaded");
    Ok(Self {
      agents,
      state_dir: Some(state_dir.to_path_buf()),
    })
  }

  pub fn register(
    &mut self,
    name: impl Into<String>,
    agent_type: impl Into<String>,
    metadata: Map<String, Value>,
  ) -> Agent {
    let now = Utc::now();
    let mut agent_id = Uuid::new_v4().to_string();
    while self.agents.contains_key(&agent_id) {
      agent_id = Uuid::new_v4().to_string();
    }
    let agent = Agent {
      agent_id: agent_id.clone(),
      name: name.into(),
      agent_type: agent_type.into(),
      status: AgentStatus::Active,
      current_task: None,
      metadata,
      registered_at: now,
      last_seen: now,
    };
    self.agents.insert(agent_id, agent.clone());
    self.persist(&agent);
    info!(event = "agent_registered", agent_id = %agent.agent_id, name = %agent.name, agent_type = %agent.agent_type, "agent registered");
    agent
  }

  pub fn heartbeat(&mut self, agent_id: &str) -> Result<Agent, CoordError> {
    let agent = self
      .agents
      .get_mut(agent_id)
      .ok_or_else(|| CoordError::AgentNotFound(agent_id.to_string()))?;
    agent.last_seen = Utc::now();
    let agent = agent.clone();
    self.persist(&agent);
    Ok(agent)
  }

  /// Set status and replace `current_task`; counts as a sign of life.
  pub fn update_status(
    &mut self,
    agent_id: &str,
    status: AgentStatus,
    current_task: Option<String>,
  ) -> Result<Agent, CoordError> {
    let agent = self
      .agents
      .get_mut(agent_id)
      .ok_or_else(|| CoordError::AgentNotFound(agent_id.to_string()))?;
    agent.status = status;
    agent.current_task = current_task;
    agent.last_seen = Utc::now();
    let agent = agent.clone();
    self.persist(&agent);
    info!(event = "agent_status_updated", agent_id, status = ?agent.status, current_task = ?agent.current_task, "agent status updated");
    Ok(agent)
  }

  pub fn get(&self, agent_id: &str) -> Option<&Agent> {
    self.agents.get(agent_id)
  }

  pub fn contains(&self, agent_id: &str) -> bool {
    self.agents.contains_key(agent_id)
  }

  pub fn len(&self) -> usize {
    self.agents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.agents.is_empty()
  }

  /// All agents ordered by registration time.
  pub fn list(&self) -> Vec<Agent> {
    let mut agents: Vec<Agent> = self.agents.values().cloned().collect();
    agents.sort_by(|a, b| {
      a.registered_at
        .cmp(&b.registered_at)
        .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    agents
  }

  /// Remove an agent. Returns `None` when it was already absent.
  pub fn unregister(&mut self, agent_id: &str) -> Option<Agent> {
    let removed = self.agents.remove(agent_id)?;
    self.forget(agent_id);
    info!(event = "agent_unregistered", agent_id, "agent unregistered");
    Some(removed)
  }

  pub fn cleanup_stale(&mut self, timeout: Duration) -> Vec<Agent> {
    self.cleanup_stale_at(Utc::now(), timeout)
  }

  /// Evict every agent whose `last_seen` is older than `timeout` relative to `now`.
  pub fn cleanup_stale_at(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<Agent> {
    let stale: Vec<String> = self
      .agents
      .values()
      .filter(|a| a.is_stale_at(now, timeout))
      .map(|a| a.agent_id.clone())
      .collect();
    let mut removed = Vec::with_capacity(stale.len());
    for id in stale {
      if let Some(agent) = self.agents.remove(&id) {
        self.forget(&id);
        info!(event = "agent_evicted", agent_id = %id, last_seen = %agent.last_seen, "stale agent evicted");
        removed.push(agent);
      }
    }
    removed
  }

  fn persist(&self, agent: &Agent) {
    if let Some(dir) = &self.state_dir {
      let path = fsutil::agent_path(dir, &agent.agent_id);
      if let Err(error) = fsutil::write_json_atomic(&path, agent) {
        warn!(event = "agent_persist_failed", agent_id = %agent.agent_id, error = %error, "failed to persist agent record");
      }
    }
  }

  fn forget(&self, agent_id: &str) {
    if let Some(dir) = &self.state_dir
      && let Err(error) = fsutil::remove_if_exists(&fsutil::agent_path(dir, agent_id))
    {
      warn!(event = "agent_remove_failed", agent_id, error = %error, "failed to remove agent record");
    }
  }

  #[cfg(test)]
  pub(crate) fn set_last_seen(&mut self, agent_id: &str, at: DateTime<Utc>) {
    if let Some(agent) = self.agents.get_mut(agent_id) {
      agent.last_seen = at;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;
  use std::collections::HashSet;

  fn meta(key: &str, value: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(key.to_string(), Value::String(value.to_string()));
    m
  }

  #[test]
  fn register_sets_defaults() {
    let mut reg = AgentRegistry::in_memory();
    let agent = reg.register("claude-1", "claude", meta("pid", "42"));
    assert_eq!(agent.status, AgentStatus::Active);
    assert_eq!(agent.current_task, None);
    assert_eq!(agent.metadata.get("pid"), Some(&Value::String("42".into())));
    assert_eq!(agent.registered_at, agent.last_seen);
    assert!(reg.contains(&agent.agent_id));
  }

  #[test]
  fn heartbeat_unknown_agent_fails() {
    let mut reg = AgentRegistry::in_memory();
    let err = reg.heartbeat("nope").unwrap_err();
    assert!(matches!(err, CoordError::AgentNotFound(id) if id == "nope"));
  }

  #[test]
  fn heartbeat_refreshes_last_seen() {
    let mut reg = AgentRegistry::in_memory();
    let agent = reg.register("a", "worker", Map::new());
    let past = Utc::now() - chrono::Duration::seconds(600);
    reg.set_last_seen(&agent.agent_id, past);
    let refreshed = reg.heartbeat(&agent.agent_id).unwrap();
    assert!(refreshed.last_seen > past);
  }

  #[test]
  fn update_status_mutates_in_place() {
    let mut reg = AgentRegistry::in_memory();
    let agent = reg.register("a", "worker", Map::new());
    let updated = reg
      .update_status(&agent.agent_id, AgentStatus::Busy, Some("build".into()))
      .unwrap();
    assert_eq!(updated.status, AgentStatus::Busy);
    assert_eq!(updated.current_task.as_deref(), Some("build"));
    let cleared = reg
      .update_status(&agent.agent_id, AgentStatus::Idle, None)
      .unwrap();
    assert_eq!(cleared.current_task, None);
    assert!(matches!(
      reg.update_status("missing", AgentStatus::Idle, None),
      Err(CoordError::AgentNotFound(_))
    ));
  }

  #[test]
  fn unregister_is_idempotent() {
    let mut reg = AgentRegistry::in_memory();
    let agent = reg.register("a", "worker", Map::new());
    assert!(reg.unregister(&agent.agent_id).is_some());
    assert!(reg.unregister(&agent.agent_id).is_none());
    assert!(reg.is_empty());
  }

  #[test]
  fn stale_agents_are_evicted_fresh_ones_kept() {
    let mut reg = AgentRegistry::in_memory();
    let old = reg.register("old", "worker", Map::new());
    let fresh = reg.register("fresh", "worker", Map::new());
    reg.set_last_seen(&old.agent_id, Utc::now() - chrono::Duration::seconds(120));
    reg.heartbeat(&fresh.agent_id).unwrap();

    let removed = reg.cleanup_stale(Duration::from_secs(60));
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].agent_id, old.agent_id);
    let ids: Vec<String> = reg.list().into_iter().map(|a| a.agent_id).collect();
    assert_eq!(ids, vec![fresh.agent_id]);
  }

  #[test]
  fn future_last_seen_is_never_stale() {
    let mut reg = AgentRegistry::in_memory();
    let agent = reg.register("a", "worker", Map::new());
    reg.set_last_seen(&agent.agent_id, Utc::now() + chrono::Duration::seconds(30));
    assert!(reg.cleanup_stale(Duration::ZERO).is_empty());
  }

  #[test]
  fn persisted_records_survive_reopen() {
    let td = tempfile::tempdir().unwrap();
    let dir = td.path();
    let (kept, gone) = {
      let mut reg = AgentRegistry::open(dir).unwrap();
      let kept = reg.register("kept", "claude", meta("k", "v"));
      let gone = reg.register("gone", "claude", Map::new());
      reg
        .update_status(&kept.agent_id, AgentStatus::Busy, Some("t1".into()))
        .unwrap();
      reg.unregister(&gone.agent_id);
      (kept, gone)
    };
    assert!(!fsutil::agent_path(dir, &gone.agent_id).exists());

    let reg = AgentRegistry::open(dir).unwrap();
    assert_eq!(reg.len(), 1);
    let back = reg.get(&kept.agent_id).expect("reloaded");
    assert_eq!(back.status, AgentStatus::Busy);
    assert_eq!(back.current_task.as_deref(), Some("t1"));
    assert_eq!(back.metadata, meta("k", "v"));
  }

  #[test]
  fn corrupt_record_is_skipped_on_open() {
    let td = tempfile::tempdir().unwrap();
    fsutil::ensure_layout(td.path()).unwrap();
    fs::write(fsutil::agents_dir(td.path()).join("broken.json"), "{").unwrap();
    let reg = AgentRegistry::open(td.path()).unwrap();
    assert!(reg.is_empty());
  }

  proptest! {
    #[test]
    fn registered_ids_are_pairwise_distinct(n in 1usize..64) {
      let mut reg = AgentRegistry::in_memory();
      let ids: HashSet<String> = (0..n)
        .map(|i| reg.register(format!("agent-{i}"), "worker", Map::new()).agent_id)
        .collect();
      prop_assert_eq!(ids.len(), n);
      prop_assert_eq!(reg.len(), n);
    }
  }
}
