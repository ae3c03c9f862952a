use std::sync::Arc;

use super::dispatch::{MethodAlreadyRegistered, RpcModule};
use super::state::DaemonState;

pub mod agents;
pub mod commands;
pub mod daemon;
pub mod events;
pub mod locks;

/// Topics the built-in methods publish on.
pub mod topics {
  pub const AGENT_REGISTERED: &str = "agent.registered";
  pub const AGENT_STATUS: &str = "agent.status";
  pub const AGENT_UNREGISTERED: &str = "agent.unregistered";
  pub const AGENT_EVICTED: &str = "agent.evicted";
  pub const COMMAND_QUEUED: &str = "command.queued";
  pub const COMMAND_ASSIGNED: &str = "command.assigned";
  pub const COMMAND_COMPLETED: &str = "command.completed";
  pub const LOCK_ACQUIRED: &str = "lock.acquired";
  pub const LOCK_RELEASED: &str = "lock.released";
  /// Topic of `broadcast_message` calls that name none.
  pub const MESSAGE: &str = "message";
}

/// Register every built-in coordination method on `module`.
pub fn register_all(
  module: &mut RpcModule,
  state: &Arc<DaemonState>,
) -> Result<(), MethodAlreadyRegistered> {
  daemon::register(module, state)?;
  agents::register(module, state)?;
  commands::register(module, state)?;
  locks::register(module, state)?;
  events::register(module)?;
  Ok(())
}
