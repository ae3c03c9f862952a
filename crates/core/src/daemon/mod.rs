use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub mod api;
pub mod dispatch;
mod janitor;
mod server;
pub mod state;

pub use dispatch::{MethodAlreadyRegistered, RequestContext, RpcModule};
pub use state::DaemonState;

use crate::adapters::fs::{self as fsutil, StoreError};
use crate::broadcast::Broadcaster;
use crate::config::{Config, ConfigError, resolve_socket_path};
use crate::protocol::Params;

#[derive(Debug, Error)]
pub enum DaemonError {
  #[error("io: {0}")]
  Io(#[from] io::Error),
  #[error("config: {0}")]
  Config(#[from] ConfigError),
  #[error("state: {0}")]
  Store(#[from] StoreError),
  #[error("a daemon is already serving {}", socket_path.display())]
  AlreadyRunning { socket_path: PathBuf },
  #[error(transparent)]
  MethodAlreadyRegistered(#[from] MethodAlreadyRegistered),
}

/// A configured daemon that has not started serving yet. Domain modules add
/// their methods here before `start`.
pub struct Daemon {
  state: Arc<DaemonState>,
  module: RpcModule,
  state_dir: PathBuf,
}

impl Daemon {
  /// Prepare the state directory, load persisted agents and commands, and
  /// register the built-in methods.
  pub fn open(state_dir: &Path, config: Config) -> Result<Self, DaemonError> {
    fsutil::ensure_layout(state_dir)?;
    let socket_path = resolve_socket_path(state_dir, &config);
    let state = Arc::new(DaemonState::open(state_dir, config, socket_path)?);
    let mut module = RpcModule::new();
    api::register_all(&mut module, &state)?;
    Ok(Self {
      state,
      module,
      state_dir: state_dir.to_path_buf(),
    })
  }

  pub fn register_method<F>(&mut self, name: &str, handler: F) -> Result<(), DaemonError>
  where
    F: Fn(Params, &RequestContext) -> RpcResult<Value> + Send + Sync + 'static,
  {
    Ok(self.module.register_method(name, handler)?)
  }

  pub fn register_async_method<F, Fut>(&mut self, name: &str, handler: F) -> Result<(), DaemonError>
  where
    F: Fn(Params, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Value>> + Send + 'static,
  {
    Ok(self.module.register_async_method(name, handler)?)
  }

  /// Add all methods of a domain module at once.
  pub fn merge(&mut self, module: RpcModule) -> Result<(), DaemonError> {
    Ok(self.module.merge(module)?)
  }

  pub fn broadcaster(&self) -> &Broadcaster {
    &self.state.broadcaster
  }

  /// Publish an event from outside a request handler.
  pub fn broadcast(&self, topic: &str, data: Value) -> usize {
    self.state.broadcaster.broadcast(topic, data)
  }

  pub fn state(&self) -> &Arc<DaemonState> {
    &self.state
  }

  pub fn socket_path(&self) -> &Path {
    &self.state.socket_path
  }

  /// Bind the socket and start serving in the background.
  pub async fn start(self) -> Result<DaemonHandle, DaemonError> {
    let Daemon {
      state,
      module,
      state_dir,
    } = self;
    let listener = server::bind(&state.socket_path)?;
    let pid_path = fsutil::pid_path(&state_dir);
    server::write_pid_file(&pid_path)?;

    let janitor = state
      .config
      .cleanup_interval()
      .map(|period| janitor::spawn(state.clone(), period, state.shutdown_requested()));
    info!(
      event = "daemon_started",
      socket = %state.socket_path.display(),
      pid = std::process::id(),
      methods = module.method_names().len(),
      "daemon server started"
    );
    let task = server::spawn_accept_loop(listener, Arc::new(module), state.clone(), pid_path.clone());

    Ok(DaemonHandle {
      task,
      janitor,
      pid_path,
      state,
    })
  }
}

/// Handle to the running daemon server.
pub struct DaemonHandle {
  task: JoinHandle<()>,
  janitor: Option<JoinHandle<()>>,
  pid_path: PathBuf,
  state: Arc<DaemonState>,
}

impl DaemonHandle {
  /// Ask the daemon to stop accepting and close every connection.
  pub fn shutdown(&self) {
    self.state.request_shutdown();
  }

  /// Stop immediately and remove the socket and PID file.
  pub fn stop(self) {
    self.state.request_shutdown();
    self.task.abort();
    if let Some(janitor) = self.janitor {
      janitor.abort();
    }
    let _ = fs::remove_file(&self.state.socket_path);
    let _ = fs::remove_file(&self.pid_path);
  }

  /// Await the daemon task to finish (e.g., after shutdown).
  pub async fn wait(self) {
    let _ = self.task.await;
    if let Some(janitor) = self.janitor {
      let _ = janitor.await;
    }
  }

  /// Get the socket path the daemon is bound to.
  pub fn socket_path(&self) -> &Path {
    &self.state.socket_path
  }

  pub fn state(&self) -> &Arc<DaemonState> {
    &self.state
  }
}

/// Open the state directory and start serving with only the built-in methods.
pub async fn start(state_dir: &Path, config: Config) -> Result<DaemonHandle, DaemonError> {
  Daemon::open(state_dir, config)?.start().await
}
