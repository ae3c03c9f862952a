use jsonrpsee::core::RpcResult;
use jsonrpsee::types::{ErrorCode, ErrorObjectOwned};
use serde_json::{Value, json};
use tracing::debug;

use super::topics;
use crate::broadcast::is_valid_pattern;
use crate::daemon::dispatch::{MethodAlreadyRegistered, RpcModule};
use crate::rpc::{
  BroadcastMessageParams, BroadcastMessageResult, SubscribeParams, SubscriptionsResult,
};

fn invalid_pattern(pattern: &str) -> ErrorObjectOwned {
  ErrorObjectOwned::owned(
    ErrorCode::InvalidParams.code(),
    format!("invalid topic pattern `{pattern}`"),
    None::<()>,
  )
}

/// Register pub/sub APIs: broadcast_message, subscribe, unsubscribe.
pub fn register(module: &mut RpcModule) -> Result<(), MethodAlreadyRegistered> {
  // ---- broadcast_message ----
  module.register_method("broadcast_message", |params, ctx| -> RpcResult<Value> {
    let p: BroadcastMessageParams = params.parse()?;
    let data = json!({
      "message": p.message,
      "from": ctx.connection().linked_agent_id(),
    });
    let sent_to = match p.topic.as_deref() {
      Some(topic) => ctx.broadcast(topic, data),
      None => ctx.broadcaster().broadcast_to_all(topics::MESSAGE, data),
    };
    Ok(json!(BroadcastMessageResult { sent_to }))
  })?;

  // ---- subscribe ----
  module.register_method("subscribe", |params, ctx| -> RpcResult<Value> {
    let p: SubscribeParams = params.parse()?;
    if let Some(bad) = p.topics.iter().find(|t| !is_valid_pattern(t)) {
      return Err(invalid_pattern(bad));
    }
    for pattern in &p.topics {
      ctx.broadcaster().subscribe(ctx.connection(), pattern);
    }
    debug!(event = "subscribed", conn_id = ctx.connection().id(), topics = ?p.topics, "connection subscribed");
    Ok(json!(SubscriptionsResult {
      subscriptions: ctx.connection().subscriptions(),
    }))
  })?;

  // ---- unsubscribe ----
  module.register_method("unsubscribe", |params, ctx| -> RpcResult<Value> {
    let p: SubscribeParams = params.parse()?;
    for pattern in &p.topics {
      ctx.broadcaster().unsubscribe(ctx.connection(), pattern);
    }
    Ok(json!(SubscriptionsResult {
      subscriptions: ctx.connection().subscriptions(),
    }))
  })?;

  Ok(())
}
