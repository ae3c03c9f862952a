use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use serde_json::{Value, json};

use super::topics;
use crate::daemon::dispatch::{MethodAlreadyRegistered, RpcModule};
use crate::daemon::state::DaemonState;
use crate::locks::acquire_with_timeout;
use crate::rpc::{AcquireLockParams, AcquireLockResult, ReleaseLockParams, ReleaseLockResult};

/// Register lock APIs: acquire_lock (async, may wait), release_lock, list_locks.
pub fn register(
  module: &mut RpcModule,
  state: &Arc<DaemonState>,
) -> Result<(), MethodAlreadyRegistered> {
  // ---- acquire_lock ----
  let st = state.clone();
  module.register_async_method("acquire_lock", move |params, ctx| {
    let st = st.clone();
    async move {
      let p: AcquireLockParams = params.parse()?;
      let wait = st.lock_wait(p.timeout);
      let poll = st.config.lock_poll_interval();
      let acquired = acquire_with_timeout(&st.locks, &p.agent_id, &p.resource, wait, poll).await;
      let result = match acquired {
        Some(acquired) => {
          if acquired.is_new() {
            ctx.broadcast(topics::LOCK_ACQUIRED, json!(acquired.lock()));
          }
          AcquireLockResult {
            acquired: true,
            lock_id: Some(acquired.into_lock().lock_id),
          }
        }
        None => AcquireLockResult {
          acquired: false,
          lock_id: None,
        },
      };
      RpcResult::Ok(json!(result))
    }
  })?;

  // ---- release_lock ----
  let st = state.clone();
  module.register_method("release_lock", move |params, ctx| -> RpcResult<Value> {
    let p: ReleaseLockParams = params.parse()?;
    let released = st.locks.lock().release(&p.lock_id);
    if let Some(lock) = &released {
      ctx.broadcast(topics::LOCK_RELEASED, json!(lock));
    }
    Ok(json!(ReleaseLockResult {
      released: released.is_some(),
    }))
  })?;

  // ---- list_locks ----
  let st = state.clone();
  module.register_method("list_locks", move |_params, _ctx| -> RpcResult<Value> {
    Ok(json!(st.locks.lock().list()))
  })?;

  Ok(())
}
