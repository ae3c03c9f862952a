//! Newline-delimited JSON-RPC 2.0 framing used on the daemon socket.
//!
//! Every message is one JSON object terminated by `\n`. Requests carry an
//! `id` and get exactly one response with the same `id`; server-initiated
//! events are notifications with method `event` and no `id`. The envelopes
//! themselves are the `jsonrpsee` wire types.

use std::borrow::Cow;

use jsonrpsee::core::RpcResult;
use jsonrpsee::types::{
  ErrorCode, ErrorObjectOwned, Id, InvalidRequest, Notification, Request, Response, ResponsePayload,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Method name used for server-pushed notifications.
pub const EVENT_METHOD: &str = "event";

/// Reply to one call.
pub type RpcResponse = Response<'static, Value>;

/// Server-pushed `event` notification.
pub type EventNotification = Notification<'static, EventParams>;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
  /// Has an `id` member (`null` included) and gets exactly one response.
  Call {
    id: Id<'static>,
    method: String,
    params: Params,
  },
  /// No `id` member: executed, never answered.
  Notify { method: String, params: Params },
}

impl Incoming {
  pub fn method(&self) -> &str {
    match self {
      Incoming::Call { method, .. } | Incoming::Notify { method, .. } => method,
    }
  }

  /// `None` for client notifications.
  pub fn id(&self) -> Option<&Id<'static>> {
    match self {
      Incoming::Call { id, .. } => Some(id),
      Incoming::Notify { .. } => None,
    }
  }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("parse error: {0}")]
  Parse(String),
  #[error("invalid request: {reason}")]
  InvalidRequest { id: Id<'static>, reason: String },
}

impl ProtocolError {
  /// Id to echo back in the error response; `null` when none could be recovered.
  pub fn id(&self) -> Id<'static> {
    match self {
      ProtocolError::Parse(_) => Id::Null,
      ProtocolError::InvalidRequest { id, .. } => id.clone(),
    }
  }
}

impl From<ProtocolError> for ErrorObjectOwned {
  fn from(err: ProtocolError) -> Self {
    let code = match &err {
      ProtocolError::Parse(_) => ErrorCode::ParseError,
      ProtocolError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
    };
    ErrorObjectOwned::owned(code.code(), err.to_string(), None::<()>)
  }
}

fn invalid(id: Id<'static>, reason: impl ToString) -> ProtocolError {
  ProtocolError::InvalidRequest {
    id,
    reason: reason.to_string(),
  }
}

/// Parse one line into a call or a client notification.
pub fn parse_message(line: &str) -> Result<Incoming, ProtocolError> {
  let value: Value =
    serde_json::from_str(line).map_err(|e| ProtocolError::Parse(e.to_string()))?;
  let Some(obj) = value.as_object() else {
    return Err(invalid(Id::Null, "expected a JSON object"));
  };

  if !obj.contains_key("id") {
    let notif: Notification<'_, Option<Value>> =
      serde_json::from_str(line).map_err(|e| invalid(Id::Null, e))?;
    if notif.method.is_empty() {
      return Err(invalid(Id::Null, "method must not be empty"));
    }
    return Ok(Incoming::Notify {
      method: notif.method.into_owned(),
      params: Params::new(notif.params.unwrap_or(Value::Null)),
    });
  }

  let recovered_id = || {
    serde_json::from_str::<InvalidRequest<'_>>(line)
      .map(|r| r.id.into_owned())
      .unwrap_or(Id::Null)
  };
  let req: Request<'_> = serde_json::from_str(line).map_err(|e| invalid(recovered_id(), e))?;
  let id = req.id.into_owned();
  if req.method.is_empty() {
    return Err(invalid(id, "method must not be empty"));
  }
  let params = match req.params {
    Some(raw) => serde_json::from_str(raw.get()).map_err(|e| invalid(id.clone(), e))?,
    None => Value::Null,
  };
  Ok(Incoming::Call {
    id,
    method: req.method.into_owned(),
    params: Params::new(params),
  })
}

/// Request parameters handed to method handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Value);

impl Params {
  pub fn new(value: Value) -> Self {
    Self(value)
  }

  /// Deserialize into `T`; absent params are treated as an empty object.
  pub fn parse<T: DeserializeOwned>(&self) -> RpcResult<T> {
    let value = match &self.0 {
      Value::Null => Value::Object(serde_json::Map::new()),
      other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| {
      ErrorObjectOwned::owned(
        ErrorCode::InvalidParams.code(),
        format!("invalid params: {e}"),
        None::<()>,
      )
    })
  }

  pub fn as_value(&self) -> &Value {
    &self.0
  }
}

pub fn response(id: Id<'static>, result: RpcResult<Value>) -> RpcResponse {
  let payload = match result {
    Ok(value) => ResponsePayload::success(value),
    Err(err) => ResponsePayload::error(err),
  };
  Response::new(payload, id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventParams {
  pub event: String,
  pub data: Value,
}

pub fn event_notification(topic: &str, data: Value) -> EventNotification {
  Notification::new(
    Cow::Borrowed(EVENT_METHOD),
    EventParams {
      event: topic.to_string(),
      data,
    },
  )
}

/// Serialize a message as a single `\n`-terminated line.
pub fn encode_line<T: Serialize>(msg: &T) -> serde_json::Result<String> {
  let mut line = serde_json::to_string(msg)?;
  line.push('\n');
  Ok(line)
}
