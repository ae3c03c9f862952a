//! Parameter and result shapes of the built-in RPC methods.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::queue::CommandStatus;
use crate::registry::AgentStatus;

/// Response type for daemon.status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DaemonStatus {
  pub version: String,
  pub pid: u32,
  pub socket_path: String,
  pub agents: usize,
  pub connections: usize,
  pub queued_commands: usize,
}

// ---- Agents ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RegisterAgentParams {
  pub name: String,
  pub agent_type: String,
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RegisterAgentResult {
  pub agent_id: String,
  pub status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentIdParams {
  pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HeartbeatResult {
  /// Always "ok"
  pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UpdateAgentStatusParams {
  pub agent_id: String,
  pub status: AgentStatus,
  #[serde(default)]
  pub current_task: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UpdateAgentStatusResult {
  pub status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UnregisterAgentResult {
  pub unregistered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct CleanupStaleParams {
  /// Seconds without a heartbeat; falls back to the configured timeout
  #[serde(default)]
  pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CleanupStaleResult {
  pub removed: Vec<String>,
}

// ---- Commands ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueCommandParams {
  pub command: String,
  #[serde(default)]
  pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueCommandResult {
  pub command_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandIdParams {
  pub command_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CompleteCommandParams {
  pub command_id: String,
  #[serde(default)]
  pub result: Value,
  pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CompleteCommandResult {
  pub status: CommandStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct ListCommandsParams {
  #[serde(default)]
  pub status: Option<CommandStatus>,
}

// ---- Locks ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AcquireLockParams {
  pub agent_id: String,
  pub resource: String,
  /// Seconds to wait for a held lock; 0 is a single attempt
  #[serde(default)]
  pub timeout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AcquireLockResult {
  pub acquired: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lock_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseLockParams {
  pub lock_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseLockResult {
  pub released: bool,
}

// ---- Events ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BroadcastMessageParams {
  pub message: Value,
  #[serde(default)]
  pub topic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BroadcastMessageResult {
  pub sent_to: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubscribeParams {
  pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubscriptionsResult {
  pub subscriptions: Vec<String>,
}
