//! Topic-pattern pub/sub fan-out to live connections.
//!
//! Delivery is best-effort: only connections attached at broadcast time are
//! considered, a full outbound queue drops the event, and nothing is retained
//! for later replay.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionId, TrySendError};
use crate::protocol::{encode_line, event_notification};

/// Pattern that matches every topic.
pub const MATCH_ALL: &str = "*";

/// Exact match, `prefix.*` for any topic under `prefix.`, or `*` for everything.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
  if pattern == MATCH_ALL || pattern == topic {
    return true;
  }
  match pattern.strip_suffix(".*") {
    Some(prefix) => topic
      .strip_prefix(prefix)
      .is_some_and(|rest| rest.len() > 1 && rest.starts_with('.')),
    None => false,
  }
}

/// Whether `pattern` is a subscribable pattern: `*`, or dot-separated segments
/// optionally ending in `.*`.
pub fn is_valid_pattern(pattern: &str) -> bool {
  pattern == MATCH_ALL || pattern_regex().is_match(pattern)
}

fn pattern_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*(\.\*)?$").expect("valid regex")
  })
}

#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
  connections: Arc<Mutex<HashMap<ConnectionId, Connection>>>,
}

impl Broadcaster {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn attach(&self, connection: Connection) {
    self.connections.lock().insert(connection.id(), connection);
  }

  /// Forget a connection; its subscriptions go with it.
  pub fn detach(&self, id: ConnectionId) -> Option<Connection> {
    self.connections.lock().remove(&id)
  }

  pub fn connection_count(&self) -> usize {
    self.connections.lock().len()
  }

  pub fn subscribe(&self, connection: &Connection, pattern: &str) -> bool {
    connection.subscribe(pattern)
  }

  pub fn unsubscribe(&self, connection: &Connection, pattern: &str) -> bool {
    connection.unsubscribe(pattern)
  }

  /// Deliver `{event: topic, data}` to every connection subscribed to `topic`.
  /// Returns how many connections the event was queued for.
  pub fn broadcast(&self, topic: &str, data: Value) -> usize {
    self.fan_out(topic, data, |c| c.is_subscribed_to(topic))
  }

  /// Deliver to every live connection regardless of subscriptions.
  pub fn broadcast_to_all(&self, topic: &str, data: Value) -> usize {
    self.fan_out(topic, data, |_| true)
  }

  fn fan_out(&self, topic: &str, data: Value, wants: impl Fn(&Connection) -> bool) -> usize {
    let targets: Vec<Connection> = self
      .connections
      .lock()
      .values()
      .filter(|c| wants(c))
      .cloned()
      .collect();
    if targets.is_empty() {
      debug!(event = "broadcast_no_subscribers", topic, "no matching connections");
      return 0;
    }
    let line = match encode_line(&event_notification(topic, data)) {
      Ok(line) => line,
      Err(error) => {
        warn!(event = "broadcast_encode_failed", topic, error = %error, "failed to encode notification");
        return 0;
      }
    };
    let mut sent = 0;
    for conn in targets {
      match conn.try_send_line(line.clone()) {
        Ok(()) => sent += 1,
        Err(TrySendError::Full) => {
          warn!(event = "broadcast_dropped_slow_consumer", topic, conn_id = conn.id(), "outbound queue full; event dropped");
        }
        Err(TrySendError::Closed) => {
          self.detach(conn.id());
        }
      }
    }
    debug!(event = "broadcast_sent", topic, sent, "event broadcast");
    sent
  }
}
