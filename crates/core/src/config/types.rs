use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log level for the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Off,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

/// Effective configuration after merging defaults, global, and project config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
  pub log_level: LogLevel,
  /// Agents without a heartbeat for this long are evicted (defaults to 300)
  pub stale_agent_timeout_secs: u64,
  /// Period of the stale-agent sweep; 0 disables it (defaults to 60)
  pub cleanup_interval_secs: u64,
  /// Sleep between attempts while waiting on a held lock (defaults to 50)
  pub lock_poll_interval_ms: u64,
  /// Upper bound applied to any `acquire_lock` timeout (defaults to 30)
  pub max_lock_wait_secs: u64,
  /// Outbound messages buffered per connection before events are dropped (defaults to 256)
  pub outbound_queue_capacity: usize,
  /// Socket path override; None means `<state_dir>/daemon.sock`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub socket_path: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: LogLevel::Info,
      stale_agent_timeout_secs: 300,
      cleanup_interval_secs: 60,
      lock_poll_interval_ms: 50,
      max_lock_wait_secs: 30,
      outbound_queue_capacity: 256,
      socket_path: None,
    }
  }
}

impl Config {
  pub fn stale_agent_timeout(&self) -> Duration {
    Duration::from_secs(self.stale_agent_timeout_secs)
  }

  pub fn cleanup_interval(&self) -> Option<Duration> {
    (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
  }

  pub fn lock_poll_interval(&self) -> Duration {
    Duration::from_millis(self.lock_poll_interval_ms)
  }

  pub fn max_lock_wait(&self) -> Duration {
    Duration::from_secs(self.max_lock_wait_secs)
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("`{field}` must be greater than zero")]
  MustBePositive { field: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
