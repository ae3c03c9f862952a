use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use serde_json::Value;
use tracing::info;

use crate::daemon::dispatch::{MethodAlreadyRegistered, RpcModule};
use crate::daemon::state::DaemonState;
use crate::rpc::DaemonStatus;

/// Register daemon.status and daemon.shutdown APIs.
pub fn register(
  module: &mut RpcModule,
  state: &Arc<DaemonState>,
) -> Result<(), MethodAlreadyRegistered> {
  let st = state.clone();
  module.register_method("daemon.status", move |_params, _ctx| -> RpcResult<Value> {
    // One guard at a time: each count is taken in its own statement.
    let agents = st.registry.lock().len();
    let connections = st.broadcaster.connection_count();
    let queued_commands = st.queue.lock().queued_len();
    let status = DaemonStatus {
      version: env!("CARGO_PKG_VERSION").to_string(),
      pid: std::process::id(),
      socket_path: st.socket_path.display().to_string(),
      agents,
      connections,
      queued_commands,
    };
    info!(event = "daemon_status", pid = status.pid, socket = %status.socket_path, version = %status.version, "status served");
    Ok(serde_json::json!(status))
  })?;

  let st = state.clone();
  module.register_method("daemon.shutdown", move |_params, _ctx| -> RpcResult<Value> {
    info!(
      event = "daemon_shutdown_requested",
      "shutdown requested via RPC"
    );
    st.request_shutdown();
    Ok(serde_json::json!(true))
  })?;
  Ok(())
}
