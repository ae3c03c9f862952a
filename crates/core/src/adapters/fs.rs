use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("io at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("json at {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl StoreError {
  fn io(path: &Path, source: io::Error) -> Self {
    StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Return path to the `.switchboard` state folder inside the given project root
pub fn state_dir(project_root: &Path) -> PathBuf {
  project_root.join(".switchboard")
}

/// Standard paths under the state directory
pub fn logs_path(state_dir: &Path) -> PathBuf {
  state_dir.join("logs.jsonl")
}

pub fn agents_dir(state_dir: &Path) -> PathBuf {
  state_dir.join("agents")
}

pub fn agent_path(state_dir: &Path, agent_id: &str) -> PathBuf {
  agents_dir(state_dir).join(format!("{agent_id}.json"))
}

pub fn queue_path(state_dir: &Path) -> PathBuf {
  state_dir.join("queue.json")
}

pub fn socket_path(state_dir: &Path) -> PathBuf {
  state_dir.join("daemon.sock")
}

pub fn pid_path(state_dir: &Path) -> PathBuf {
  state_dir.join("daemon.pid")
}

/// Ensure the state layout exists (directories are created if missing)
pub fn ensure_layout(state_dir: &Path) -> io::Result<()> {
  fs::create_dir_all(agents_dir(state_dir))?;
  Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` atomically via a sibling temp file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
  }
  let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
    path: path.to_path_buf(),
    source,
  })?;
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = PathBuf::from(tmp);
  fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
  fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
  Ok(())
}

/// Read a JSON file; a missing file yields `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
  let bytes = match fs::read(path) {
    Ok(b) => b,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(StoreError::io(path, e)),
  };
  serde_json::from_slice(&bytes)
    .map(Some)
    .map_err(|source| StoreError::Json {
      path: path.to_path_buf(),
      source,
    })
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
  match fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(StoreError::io(path, e)),
  }
}
