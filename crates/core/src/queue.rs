//! Persisted priority queue of commands claimable by any agent.
//!
//! Selection is max-priority over queued commands with ties broken by
//! enqueue order. The whole queue is snapshotted to `queue.json` after every
//! mutation.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::fs::{self as fsutil, StoreError};
use crate::error::CoordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
  Queued,
  Assigned,
  Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
  pub command_id: String,
  pub command: String,
  pub priority: i64,
  pub status: CommandStatus,
  #[serde(default)]
  pub assigned_to: Option<String>,
  #[serde(default)]
  pub result: Option<Value>,
  #[serde(default)]
  pub success: Option<bool>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub assigned_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub completed_at: Option<DateTime<Utc>>,
  /// Enqueue order, used to break priority ties.
  pub seq: u64,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Ready {
  priority: i64,
  seq: Reverse<u64>,
  command_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueSnapshot {
  next_seq: u64,
  commands: Vec<Command>,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
  commands: HashMap<String, Command>,
  ready: BinaryHeap<Ready>,
  next_seq: u64,
  path: Option<PathBuf>,
}

impl CommandQueue {
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Load `queue.json` from `state_dir`, rebuilding the ready heap from queued commands.
  pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
    let path = fsutil::queue_path(state_dir);
    let snapshot: QueueSnapshot = fsutil::read_json(&path)?.unwrap_or_default();
    let mut queue = Self {
      path: Some(path),
      ..Self::default()
    };
    let mut max_seq = 0u64;
    for cmd in snapshot.commands {
      max_seq = max_seq.max(cmd.seq + 1);
      if cmd.status == CommandStatus::Queued {
        queue.ready.push(Ready {
          priority: cmd.priority,
          seq: Reverse(cmd.seq),
          command_id: cmd.command_id.clone(),
        });
      }
      queue.commands.insert(cmd.command_id.clone(), cmd);
    }
    queue.next_seq = snapshot.next_seq.max(max_seq);
    info!(event = "command_queue_loaded", total = queue.commands.len(), queued = queue.queued_len(), "command queue loaded");
    Ok(queue)
  }

  pub fn queue_command(&mut self, command: impl Into<String>, priority: i64) -> Command {
    let seq = self.next_seq;
    self.next_seq += 1;
    let mut command_id = Uuid::new_v4().to_string();
    while self.commands.contains_key(&command_id) {
      command_id = Uuid::new_v4().to_string();
    }
    let cmd = Command {
      command_id: command_id.clone(),
      command: command.into(),
      priority,
      status: CommandStatus::Queued,
      assigned_to: None,
      result: None,
      success: None,
      created_at: Utc::now(),
      assigned_at: None,
      completed_at: None,
      seq,
    };
    self.ready.push(Ready {
      priority,
      seq: Reverse(seq),
      command_id: command_id.clone(),
    });
    self.commands.insert(command_id, cmd.clone());
    self.persist();
    info!(event = "command_queued", command_id = %cmd.command_id, priority, seq, "command queued");
    cmd
  }

  /// Assign the most urgent queued command to `agent_id`.
  pub fn get_next_command(&mut self, agent_id: &str) -> Option<Command> {
    while let Some(ready) = self.ready.pop() {
      let Some(cmd) = self.commands.get_mut(&ready.command_id) else {
        continue;
      };
      // Entries for commands completed while still queued are skipped lazily.
      if cmd.status != CommandStatus::Queued {
        continue;
      }
      cmd.status = CommandStatus::Assigned;
      cmd.assigned_to = Some(agent_id.to_string());
      cmd.assigned_at = Some(Utc::now());
      let cmd = cmd.clone();
      self.persist();
      info!(event = "command_assigned", command_id = %cmd.command_id, agent_id, priority = cmd.priority, "command assigned");
      return Some(cmd);
    }
    None
  }

  pub fn complete_command(
    &mut self,
    command_id: &str,
    result: Value,
    success: bool,
  ) -> Result<Command, CoordError> {
    let cmd = self
      .commands
      .get_mut(command_id)
      .ok_or_else(|| CoordError::CommandNotFound(command_id.to_string()))?;
    if cmd.status == CommandStatus::Completed {
      return Err(CoordError::CommandAlreadyCompleted(command_id.to_string()));
    }
    cmd.status = CommandStatus::Completed;
    cmd.result = Some(result);
    cmd.success = Some(success);
    cmd.completed_at = Some(Utc::now());
    let cmd = cmd.clone();
    self.persist();
    info!(event = "command_completed", command_id, success, assigned_to = ?cmd.assigned_to, "command completed");
    Ok(cmd)
  }

  pub fn get_command_status(&self, command_id: &str) -> Option<Command> {
    self.commands.get(command_id).cloned()
  }

  /// Commands in enqueue order, optionally filtered by status.
  pub fn list(&self, status: Option<CommandStatus>) -> Vec<Command> {
    let mut cmds: Vec<Command> = self
      .commands
      .values()
      .filter(|c| status.is_none_or(|s| c.status == s))
      .cloned()
      .collect();
    cmds.sort_by_key(|c| c.seq);
    cmds
  }

  pub fn queued_len(&self) -> usize {
    self
      .commands
      .values()
      .filter(|c| c.status == CommandStatus::Queued)
      .count()
  }

  fn persist(&self) {
    let Some(path) = &self.path else {
      return;
    };
    let snapshot = QueueSnapshot {
      next_seq: self.next_seq,
      commands: self.list(None),
    };
    if let Err(error) = fsutil::write_json_atomic(path, &snapshot) {
      warn!(event = "command_queue_persist_failed", path = %path.display(), error = %error, "failed to persist command queue");
    }
  }
}
