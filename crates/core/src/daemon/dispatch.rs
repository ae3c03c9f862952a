//! Method registry and per-line request dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use jsonrpsee::types::{ErrorCode, ErrorObjectOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::broadcast::Broadcaster;
use crate::connection::Connection;
use crate::protocol::{Incoming, Params, RpcResponse, parse_message, response};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type SyncMethod = Arc<dyn Fn(Params, &RequestContext) -> RpcResult<Value> + Send + Sync>;
type AsyncMethod = Arc<dyn Fn(Params, RequestContext) -> BoxFuture<RpcResult<Value>> + Send + Sync>;

#[derive(Clone)]
enum Method {
  Sync(SyncMethod),
  Async(AsyncMethod),
}

#[derive(Debug, Error)]
#[error("method already registered: {0}")]
pub struct MethodAlreadyRegistered(pub String);

/// What a handler gets to see besides its params: the calling connection and
/// the broadcaster.
#[derive(Debug, Clone)]
pub struct RequestContext {
  connection: Connection,
  broadcaster: Broadcaster,
}

impl RequestContext {
  pub fn new(connection: Connection, broadcaster: Broadcaster) -> Self {
    Self {
      connection,
      broadcaster,
    }
  }

  pub fn connection(&self) -> &Connection {
    &self.connection
  }

  pub fn broadcaster(&self) -> &Broadcaster {
    &self.broadcaster
  }

  /// Publish `data` on `topic` to every subscribed connection.
  pub fn broadcast(&self, topic: &str, data: Value) -> usize {
    self.broadcaster.broadcast(topic, data)
  }
}

#[derive(Clone, Default)]
pub struct RpcModule {
  methods: HashMap<String, Method>,
}

impl RpcModule {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler that runs to completion without awaiting.
  pub fn register_method<F>(&mut self, name: &str, handler: F) -> Result<(), MethodAlreadyRegistered>
  where
    F: Fn(Params, &RequestContext) -> RpcResult<Value> + Send + Sync + 'static,
  {
    self.insert(name, Method::Sync(Arc::new(handler)))
  }

  /// Register a handler returning a future, for methods that wait.
  pub fn register_async_method<F, Fut>(
    &mut self,
    name: &str,
    handler: F,
  ) -> Result<(), MethodAlreadyRegistered>
  where
    F: Fn(Params, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Value>> + Send + 'static,
  {
    let handler: AsyncMethod = Arc::new(
      move |params: Params, ctx: RequestContext| -> BoxFuture<RpcResult<Value>> {
        Box::pin(handler(params, ctx))
      },
    );
    self.insert(name, Method::Async(handler))
  }

  /// Move every method of `other` into this module. Fails on the first clash
  /// and leaves `self` untouched in that case.
  pub fn merge(&mut self, other: RpcModule) -> Result<(), MethodAlreadyRegistered> {
    if let Some(name) = other.methods.keys().find(|n| self.methods.contains_key(*n)) {
      return Err(MethodAlreadyRegistered(name.clone()));
    }
    self.methods.extend(other.methods);
    Ok(())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.methods.contains_key(name)
  }

  pub fn method_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.methods.keys().cloned().collect();
    names.sort();
    names
  }

  fn insert(&mut self, name: &str, method: Method) -> Result<(), MethodAlreadyRegistered> {
    if self.methods.contains_key(name) {
      return Err(MethodAlreadyRegistered(name.to_string()));
    }
    self.methods.insert(name.to_string(), method);
    Ok(())
  }

  /// Invoke `method`. The handler runs on its own task so a panic surfaces
  /// as an internal error instead of tearing down the connection.
  pub async fn call(&self, method: &str, params: Params, ctx: &RequestContext) -> RpcResult<Value> {
    let Some(handler) = self.methods.get(method).cloned() else {
      debug!(event = "rpc_method_not_found", method, "unknown method");
      return Err(ErrorObjectOwned::owned(
        ErrorCode::MethodNotFound.code(),
        format!("method not found: {method}"),
        None::<()>,
      ));
    };
    let ctx = ctx.clone();
    let fut: BoxFuture<RpcResult<Value>> = match handler {
      Method::Sync(f) => Box::pin(async move { f(params, &ctx) }),
      Method::Async(f) => f(params, ctx),
    };
    match tokio::spawn(fut).await {
      Ok(result) => result,
      Err(join_err) => {
        error!(event = "rpc_handler_panicked", method, panic = join_err.is_panic(), error = %join_err, "handler failed");
        Err(ErrorObjectOwned::owned(
          ErrorCode::InternalError.code(),
          format!("internal error in {method}"),
          None::<()>,
        ))
      }
    }
  }
}

/// Handle one inbound line. Returns the response to write back, or `None`
/// for blank lines and client notifications.
pub async fn handle_line(module: &RpcModule, line: &str, ctx: &RequestContext) -> Option<RpcResponse> {
  let line = line.trim();
  if line.is_empty() {
    return None;
  }
  let message = match parse_message(line) {
    Ok(message) => message,
    Err(err) => {
      warn!(event = "rpc_bad_request", conn_id = ctx.connection().id(), error = %err, "rejecting malformed request");
      return Some(response(err.id(), Err(err.into())));
    }
  };
  match message {
    Incoming::Call { id, method, params } => {
      let result = module.call(&method, params, ctx).await;
      Some(response(id, result))
    }
    Incoming::Notify { method, params } => {
      if let Err(err) = module.call(&method, params, ctx).await {
        debug!(event = "rpc_notification_failed", method = %method, code = err.code(), "notification failed");
      }
      None
    }
  }
}
