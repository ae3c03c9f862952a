use std::env;
use std::path::{Path, PathBuf};

use super::types::Config;
use crate::adapters::fs as fsutil;

pub const SOCKET_ENV: &str = "SWITCHBOARD_SOCKET";

/// Location of the global config file (~/.config/switchboard/config.toml)
pub fn global_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|p| p.join("switchboard").join("config.toml"))
}

/// Location of the project config file (<state_dir>/config.toml)
pub fn project_config_path(state_dir: &Path) -> PathBuf {
  state_dir.join("config.toml")
}

/// Resolve the socket path: SWITCHBOARD_SOCKET, then config, then `<state_dir>/daemon.sock`.
pub fn resolve_socket_path(state_dir: &Path, cfg: &Config) -> PathBuf {
  resolve_socket_path_for(env::var_os(SOCKET_ENV).map(PathBuf::from), state_dir, cfg)
}

pub(crate) fn resolve_socket_path_for(
  env_socket: Option<PathBuf>,
  state_dir: &Path,
  cfg: &Config,
) -> PathBuf {
  if let Some(val) = env_socket {
    return val;
  }
  if let Some(p) = &cfg.socket_path {
    return p.clone();
  }
  fsutil::socket_path(state_dir)
}
