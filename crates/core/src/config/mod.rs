mod load;
mod paths;
mod types;
mod validate;

pub use load::{load, load_from_paths};
pub use paths::{SOCKET_ENV, global_config_path, project_config_path, resolve_socket_path};
pub use types::{Config, ConfigError, LogLevel, Result};

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::path::PathBuf;
  use std::time::Duration;

  #[test]
  fn defaults_are_correct() {
    let cfg = Config::default();
    assert_eq!(cfg.log_level, LogLevel::Info);
    assert_eq!(cfg.stale_agent_timeout_secs, 300);
    assert_eq!(cfg.cleanup_interval_secs, 60);
    assert_eq!(cfg.lock_poll_interval_ms, 50);
    assert_eq!(cfg.max_lock_wait_secs, 30);
    assert_eq!(cfg.outbound_queue_capacity, 256);
    assert_eq!(cfg.socket_path, None);
    assert_eq!(cfg.cleanup_interval(), Some(Duration::from_secs(60)));
  }

  #[test]
  fn merge_precedence_project_overrides_global_over_defaults() {
    let td = tempfile::tempdir().unwrap();
    let global = td.path().join("global.toml");
    let project = td.path().join("project.toml");

    fs::write(
      &global,
      r#"
log_level = "warn"
stale_agent_timeout_secs = 120
lock_poll_interval_ms = 25
"#,
    )
    .unwrap();

    fs::write(
      &project,
      r#"
log_level = "debug"
cleanup_interval_secs = 0
socket_path = "/tmp/project.sock"
"#,
    )
    .unwrap();

    let cfg = load_from_paths(Some(&global), Some(&project)).unwrap();
    // project overrides global
    assert_eq!(cfg.log_level, LogLevel::Debug);
    // global overrides default
    assert_eq!(cfg.stale_agent_timeout_secs, 120);
    assert_eq!(cfg.lock_poll_interval_ms, 25);
    // project adds values
    assert_eq!(cfg.cleanup_interval(), None);
    assert_eq!(cfg.socket_path, Some(PathBuf::from("/tmp/project.sock")));
    // untouched default
    assert_eq!(cfg.max_lock_wait_secs, 30);
  }

  #[test]
  fn missing_files_yield_defaults() {
    let td = tempfile::tempdir().unwrap();
    let cfg = load_from_paths(
      Some(&td.path().join("nope.toml")),
      Some(&td.path().join("also-nope.toml")),
    )
    .unwrap();
    assert_eq!(cfg, Config::default());
  }

  #[test]
  fn zero_poll_interval_is_rejected() {
    let td = tempfile::tempdir().unwrap();
    let project = td.path().join("project.toml");
    fs::write(&project, "lock_poll_interval_ms = 0\n").unwrap();
    let err = load_from_paths(None, Some(&project)).unwrap_err();
    match err {
      ConfigError::MustBePositive { field } => assert_eq!(field, "lock_poll_interval_ms"),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn invalid_toml_is_an_error() {
    let td = tempfile::tempdir().unwrap();
    let project = td.path().join("project.toml");
    fs::write(&project, "log_level = \"loud\"\n").unwrap();
    assert!(matches!(
      load_from_paths(None, Some(&project)),
      Err(ConfigError::Toml(_))
    ));
  }

  #[test]
  fn unreadable_config_is_an_io_error() {
    let td = tempfile::tempdir().unwrap();
    // A directory where the file should be: exists, but cannot be read as text.
    let project = td.path().join("config.toml");
    fs::create_dir(&project).unwrap();
    assert!(matches!(
      load_from_paths(None, Some(&project)),
      Err(ConfigError::Io(_))
    ));
  }

  #[test]
  fn socket_resolution_order() {
    let td = tempfile::tempdir().unwrap();
    let state = td.path();
    let mut cfg = Config::default();
    assert_eq!(
      paths::resolve_socket_path_for(None, state, &cfg),
      state.join("daemon.sock")
    );
    cfg.socket_path = Some(PathBuf::from("/tmp/cfg.sock"));
    assert_eq!(
      paths::resolve_socket_path_for(None, state, &cfg),
      PathBuf::from("/tmp/cfg.sock")
    );
    assert_eq!(
      paths::resolve_socket_path_for(Some(PathBuf::from("/tmp/env.sock")), state, &cfg),
      PathBuf::from("/tmp/env.sock")
    );
  }
}
