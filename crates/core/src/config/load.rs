use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths::{global_config_path, project_config_path};
use super::types::{Config, LogLevel, Result};
use super::validate::validate;

/// Load configuration by resolving the default global and project paths.
/// Project config overrides global; both override defaults.
pub fn load(state_dir: Option<&Path>) -> Result<Config> {
  let global = global_config_path();
  let project = state_dir.map(project_config_path);
  load_from_paths(global.as_deref(), project.as_deref())
}

/// Load configuration from explicit file paths (if present).
pub fn load_from_paths(global: Option<&Path>, project: Option<&Path>) -> Result<Config> {
  let mut cfg = Config::default();

  for path in [global, project].into_iter().flatten() {
    if let Some(partial) = read_partial(path)? {
      cfg = partial.merge_over(cfg);
    }
  }

  validate(&cfg)?;

  Ok(cfg)
}

/// A missing file contributes nothing; any other read failure is an error.
fn read_partial(path: &Path) -> Result<Option<PartialConfig>> {
  match fs::read_to_string(path) {
    Ok(s) => Ok(Some(toml::from_str(&s)?)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialConfig {
  pub log_level: Option<LogLevel>,
  pub stale_agent_timeout_secs: Option<u64>,
  pub cleanup_interval_secs: Option<u64>,
  pub lock_poll_interval_ms: Option<u64>,
  pub max_lock_wait_secs: Option<u64>,
  pub outbound_queue_capacity: Option<usize>,
  pub socket_path: Option<PathBuf>,
}

impl PartialConfig {
  fn merge_over(self, base: Config) -> Config {
    let PartialConfig {
      log_level,
      stale_agent_timeout_secs,
      cleanup_interval_secs,
      lock_poll_interval_ms,
      max_lock_wait_secs,
      outbound_queue_capacity,
      socket_path,
    } = self;

    Config {
      log_level: log_level.unwrap_or(base.log_level),
      stale_agent_timeout_secs: stale_agent_timeout_secs.unwrap_or(base.stale_agent_timeout_secs),
      cleanup_interval_secs: cleanup_interval_secs.unwrap_or(base.cleanup_interval_secs),
      lock_poll_interval_ms: lock_poll_interval_ms.unwrap_or(base.lock_poll_interval_ms),
      max_lock_wait_secs: max_lock_wait_secs.unwrap_or(base.max_lock_wait_secs),
      outbound_queue_capacity: outbound_queue_capacity.unwrap_or(base.outbound_queue_capacity),
      socket_path: socket_path.or(base.socket_path),
    }
  }
}
