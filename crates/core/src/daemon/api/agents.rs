use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::core::RpcResult;
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::{Value, json};
use tracing::info;

use super::topics;
use crate::daemon::dispatch::{MethodAlreadyRegistered, RpcModule};
use crate::daemon::state::{DaemonState, clamp_secs};
use crate::rpc::{
  AgentIdParams, CleanupStaleParams, CleanupStaleResult, HeartbeatResult, RegisterAgentParams,
  RegisterAgentResult, UnregisterAgentResult, UpdateAgentStatusParams, UpdateAgentStatusResult,
};

/// Register agent presence APIs: register_agent, heartbeat, update_agent_status,
/// list_agents, unregister_agent, cleanup_stale_agents.
pub fn register(
  module: &mut RpcModule,
  state: &Arc<DaemonState>,
) -> Result<(), MethodAlreadyRegistered> {
  // ---- register_agent ----
  let st = state.clone();
  module.register_method("register_agent", move |params, ctx| -> RpcResult<Value> {
    let p: RegisterAgentParams = params.parse()?;
    let agent = st.registry.lock().register(p.name, p.agent_type, p.metadata);
    ctx.connection().link_agent(agent.agent_id.clone());
    ctx.broadcast(topics::AGENT_REGISTERED, json!(agent));
    Ok(json!(RegisterAgentResult {
      agent_id: agent.agent_id,
      status: agent.status,
    }))
  })?;

  // ---- heartbeat ----
  let st = state.clone();
  module.register_method("heartbeat", move |params, _ctx| -> RpcResult<Value> {
    let p: AgentIdParams = params.parse()?;
    st.registry
      .lock()
      .heartbeat(&p.agent_id)
      .map_err(ErrorObjectOwned::from)?;
    Ok(json!(HeartbeatResult {
      status: "ok".to_string(),
    }))
  })?;

  // ---- update_agent_status ----
  let st = state.clone();
  module.register_method("update_agent_status", move |params, ctx| -> RpcResult<Value> {
    let p: UpdateAgentStatusParams = params.parse()?;
    let agent = st
      .registry
      .lock()
      .update_status(&p.agent_id, p.status, p.current_task)
      .map_err(ErrorObjectOwned::from)?;
    ctx.broadcast(topics::AGENT_STATUS, json!(agent));
    Ok(json!(UpdateAgentStatusResult {
      status: agent.status,
    }))
  })?;

  // ---- list_agents ----
  let st = state.clone();
  module.register_method("list_agents", move |_params, _ctx| -> RpcResult<Value> {
    Ok(json!(st.registry.lock().list()))
  })?;

  // ---- unregister_agent ----
  let st = state.clone();
  module.register_method("unregister_agent", move |params, ctx| -> RpcResult<Value> {
    let p: AgentIdParams = params.parse()?;
    let removed = st.registry.lock().unregister(&p.agent_id);
    if let Some(agent) = &removed {
      let released = st.release_locks_of(&agent.agent_id);
      info!(event = "agent_departed", agent_id = %agent.agent_id, locks_released = released.len(), "agent unregistered via RPC");
      ctx.broadcast(topics::AGENT_UNREGISTERED, json!(agent));
    }
    Ok(json!(UnregisterAgentResult {
      unregistered: removed.is_some(),
    }))
  })?;

  // ---- cleanup_stale_agents ----
  let st = state.clone();
  module.register_method("cleanup_stale_agents", move |params, _ctx| -> RpcResult<Value> {
    let p: CleanupStaleParams = params.parse()?;
    let timeout = match p.timeout {
      Some(secs) => clamp_secs(secs, Duration::MAX),
      None => st.config.stale_agent_timeout(),
    };
    let removed = st
      .evict_stale(timeout)
      .into_iter()
      .map(|a| a.agent_id)
      .collect();
    Ok(json!(CleanupStaleResult { removed }))
  })?;

  Ok(())
}
