use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::{Value, json};

use super::topics;
use crate::daemon::dispatch::{MethodAlreadyRegistered, RpcModule};
use crate::daemon::state::DaemonState;
use crate::error::CoordError;
use crate::rpc::{
  AgentIdParams, CommandIdParams, CompleteCommandParams, CompleteCommandResult,
  ListCommandsParams, QueueCommandParams, QueueCommandResult,
};

/// Register command queue APIs: queue_command, get_next_command,
/// complete_command, get_command_status, list_commands.
pub fn register(
  module: &mut RpcModule,
  state: &Arc<DaemonState>,
) -> Result<(), MethodAlreadyRegistered> {
  // ---- queue_command ----
  let st = state.clone();
  module.register_method("queue_command", move |params, ctx| -> RpcResult<Value> {
    let p: QueueCommandParams = params.parse()?;
    let cmd = st.queue.lock().queue_command(p.command, p.priority);
    ctx.broadcast(topics::COMMAND_QUEUED, json!(cmd));
    Ok(json!(QueueCommandResult {
      command_id: cmd.command_id,
    }))
  })?;

  // ---- get_next_command ----
  let st = state.clone();
  module.register_method("get_next_command", move |params, ctx| -> RpcResult<Value> {
    let p: AgentIdParams = params.parse()?;
    if !st.registry.lock().contains(&p.agent_id) {
      return Err(CoordError::AgentNotFound(p.agent_id).into());
    }
    let next = st.queue.lock().get_next_command(&p.agent_id);
    match next {
      Some(cmd) => {
        ctx.broadcast(topics::COMMAND_ASSIGNED, json!(cmd));
        Ok(json!(cmd))
      }
      None => Ok(Value::Null),
    }
  })?;

  // ---- complete_command ----
  let st = state.clone();
  module.register_method("complete_command", move |params, ctx| -> RpcResult<Value> {
    let p: CompleteCommandParams = params.parse()?;
    let cmd = st
      .queue
      .lock()
      .complete_command(&p.command_id, p.result, p.success)
      .map_err(ErrorObjectOwned::from)?;
    ctx.broadcast(topics::COMMAND_COMPLETED, json!(cmd));
    Ok(json!(CompleteCommandResult { status: cmd.status }))
  })?;

  // ---- get_command_status ----
  let st = state.clone();
  module.register_method("get_command_status", move |params, _ctx| -> RpcResult<Value> {
    let p: CommandIdParams = params.parse()?;
    // Unknown ids are a lookup miss, answered with null.
    let cmd = st.queue.lock().get_command_status(&p.command_id);
    Ok(json!(cmd))
  })?;

  // ---- list_commands ----
  let st = state.clone();
  module.register_method("list_commands", move |params, _ctx| -> RpcResult<Value> {
    let p: ListCommandsParams = params.parse()?;
    Ok(json!(st.queue.lock().list(p.status)))
  })?;

  Ok(())
}
