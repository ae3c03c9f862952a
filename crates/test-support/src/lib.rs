use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound for any single read in tests; a hang fails loudly instead.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Temporary project root for tests, with the daemon state directory inside it.
pub struct TempProject {
  pub root: tempfile::TempDir,
}

impl Default for TempProject {
  fn default() -> Self {
    Self::new()
  }
}

impl TempProject {
  pub fn new() -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    Self { root }
  }

  pub fn path(&self) -> PathBuf {
    self.root.path().to_path_buf()
  }

  /// `<root>/.switchboard`
  pub fn state_dir(&self) -> PathBuf {
    self.path().join(".switchboard")
  }

  pub fn socket_path(&self) -> PathBuf {
    self.state_dir().join("daemon.sock")
  }
}

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  use tokio::time::{Instant, sleep};
  let start = Instant::now();
  loop {
    if check().await {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    sleep(interval).await;
  }
}

/// Minimal JSON-RPC 2.0 response wrapper for tests.
#[derive(Debug, serde::Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
  pub data: Option<Value>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RpcResp<T> {
  pub jsonrpc: String,
  #[serde(default)]
  pub id: Value,
  pub result: Option<T>,
  pub error: Option<RpcError>,
}

/// Server-pushed notification payload (`params` of an `event` message).
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Event {
  pub event: String,
  pub data: Value,
}

/// A line-delimited JSON-RPC client over a Unix socket. Notifications that
/// arrive while waiting for a response are buffered for `next_event`.
pub struct RpcClient {
  reader: BufReader<OwnedReadHalf>,
  writer: OwnedWriteHalf,
  next_id: i64,
  events: VecDeque<Event>,
}

impl RpcClient {
  pub async fn connect<P: AsRef<Path>>(sock: P) -> std::io::Result<Self> {
    let stream = UnixStream::connect(sock.as_ref()).await?;
    let (read_half, write_half) = stream.into_split();
    Ok(Self {
      reader: BufReader::new(read_half),
      writer: write_half,
      next_id: 0,
      events: VecDeque::new(),
    })
  }

  /// Connect, retrying until the daemon accepts or `timeout` passes.
  pub async fn connect_when_ready<P: AsRef<Path>>(sock: P, timeout: Duration) -> Self {
    let sock = sock.as_ref().to_path_buf();
    let start = tokio::time::Instant::now();
    loop {
      match Self::connect(&sock).await {
        Ok(client) => return client,
        Err(e) if start.elapsed() >= timeout => panic!("daemon at {} not ready: {e}", sock.display()),
        Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
      }
    }
  }

  /// Write `line` verbatim, adding the trailing newline.
  pub async fn send_raw(&mut self, line: &str) {
    self.writer.write_all(line.as_bytes()).await.expect("write");
    self.writer.write_all(b"\n").await.expect("write newline");
  }

  /// Send a request without an id; the daemon writes no response.
  pub async fn notify(&mut self, method: &str, params: Value) {
    let msg = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params});
    self.send_raw(&msg.to_string()).await;
  }

  /// Read one message; `None` once the daemon closed the connection.
  async fn read_message(&mut self) -> Option<Value> {
    let mut line = String::new();
    let n = tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
      .await
      .expect("read timed out")
      .expect("read");
    if n == 0 {
      return None;
    }
    Some(serde_json::from_str(line.trim_end()).expect("valid json line"))
  }

  fn stash_if_event(&mut self, msg: &Value) -> bool {
    if msg.get("id").is_none() && msg.get("method").and_then(Value::as_str) == Some("event") {
      let event: Event = serde_json::from_value(msg["params"].clone()).expect("event params");
      self.events.push_back(event);
      return true;
    }
    false
  }

  /// Next message that is not a notification, typically the reply to `send_raw`.
  pub async fn read_response<T: DeserializeOwned>(&mut self) -> RpcResp<T> {
    loop {
      let msg = self.read_message().await.expect("connection closed");
      if !self.stash_if_event(&msg) {
        return serde_json::from_value(msg).expect("response shape");
      }
    }
  }

  pub async fn call<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> RpcResp<T> {
    self.next_id += 1;
    let id = self.next_id;
    let req = serde_json::json!({
      "jsonrpc": "2.0",
      "id": id,
      "method": method,
      "params": params
    });
    self.send_raw(&req.to_string()).await;
    loop {
      let resp: RpcResp<T> = self.read_response().await;
      if resp.id == Value::from(id) {
        return resp;
      }
    }
  }

  /// Call and unwrap the result, panicking with the error otherwise.
  pub async fn call_ok<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> T {
    let resp = self.call::<T>(method, params).await;
    if let Some(err) = resp.error {
      panic!("{method} failed: {} ({})", err.message, err.code);
    }
    resp.result.unwrap_or_else(|| panic!("{method} returned no result"))
  }

  /// Buffered or next incoming notification, or `None` after `timeout`.
  /// Responses read while waiting are dropped.
  pub async fn next_event(&mut self, timeout: Duration) -> Option<Event> {
    if let Some(event) = self.events.pop_front() {
      return Some(event);
    }
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
      let mut line = String::new();
      match tokio::time::timeout(remaining, self.reader.read_line(&mut line)).await {
        Ok(Ok(0)) | Err(_) => return None,
        Ok(Ok(_)) => {
          let msg: Value = serde_json::from_str(line.trim_end()).expect("valid json line");
          if self.stash_if_event(&msg) {
            return self.events.pop_front();
          }
        }
        Ok(Err(e)) => panic!("read: {e}"),
      }
    }
  }

  /// True once the daemon has closed the connection.
  pub async fn is_closed(&mut self) -> bool {
    let mut line = String::new();
    matches!(
      tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line)).await,
      Ok(Ok(0)) | Ok(Err(_))
    )
  }
}
