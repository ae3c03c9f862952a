use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::DaemonError;
use super::dispatch::{RequestContext, RpcModule, handle_line};
use super::state::DaemonState;
use crate::connection::{Connection, ConnectionId};
use crate::protocol::encode_line;

/// How long a closing connection may spend flushing queued lines.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Bind the listening socket, refusing when a live daemon already answers on it.
pub(super) fn bind(socket_path: &Path) -> Result<UnixListener, DaemonError> {
  if let Some(parent) = socket_path.parent() {
    fs::create_dir_all(parent)?;
  }
  if socket_path.exists() {
    if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
      return Err(DaemonError::AlreadyRunning {
        socket_path: socket_path.to_path_buf(),
      });
    }
    warn!(event = "stale_socket_removed", socket = %socket_path.display(), "removing stale socket");
    fs::remove_file(socket_path)?;
  }
  Ok(UnixListener::bind(socket_path)?)
}

fn process_alive(pid: i32) -> bool {
  matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Write `<pid>\n`, replacing whatever an earlier daemon left behind.
pub(super) fn write_pid_file(pid_path: &Path) -> io::Result<()> {
  let own = std::process::id();
  if let Ok(raw) = fs::read_to_string(pid_path)
    && let Ok(pid) = raw.trim().parse::<i32>()
    && pid != own as i32
  {
    if process_alive(pid) {
      warn!(event = "pid_file_taken_over", pid, path = %pid_path.display(), "pid file owner is alive but not serving; taking over");
    } else {
      info!(event = "stale_pid_file_removed", pid, path = %pid_path.display(), "replacing stale pid file");
    }
  }
  fs::write(pid_path, format!("{own}\n"))
}

fn remove_pid_file(pid_path: &Path) {
  let own = std::process::id().to_string();
  if let Ok(raw) = fs::read_to_string(pid_path)
    && raw.trim() == own
  {
    let _ = fs::remove_file(pid_path);
  }
}

/// Spawn the accept loop. It runs until shutdown is requested, then removes
/// the socket and PID file.
pub(super) fn spawn_accept_loop(
  listener: UnixListener,
  module: Arc<RpcModule>,
  state: Arc<DaemonState>,
  pid_path: PathBuf,
) -> JoinHandle<()> {
  let mut shutdown_rx = state.shutdown_requested();
  tokio::spawn(async move {
    let mut next_id: ConnectionId = 0;
    loop {
      tokio::select! {
        _ = shutdown_rx.changed() => {
          info!(event = "daemon_shutdown", "shutdown signal received; stopping accept loop");
          break;
        }
        res = listener.accept() => {
          match res {
            Ok((stream, _addr)) => {
              next_id += 1;
              let module = module.clone();
              let state = state.clone();
              tokio::spawn(serve_connection(stream, next_id, module, state));
            }
            Err(e) => {
              error!(event = "accept_failed", error = %e, "accept error");
              break;
            }
          }
        }
      }
    }
    let _ = fs::remove_file(&state.socket_path);
    remove_pid_file(&pid_path);
    info!(event = "daemon_stopped", socket = %state.socket_path.display(), "daemon server stopped");
  })
}

async fn serve_connection(
  stream: UnixStream,
  id: ConnectionId,
  module: Arc<RpcModule>,
  state: Arc<DaemonState>,
) {
  let (read_half, mut write_half) = stream.into_split();
  let (conn, mut rx) = Connection::channel(id, state.config.outbound_queue_capacity);
  state.broadcaster.attach(conn.clone());
  debug!(event = "connection_opened", conn_id = id, "client connected");

  // Single writer per socket: responses and events are serialized through the channel.
  let mut writer = tokio::spawn(async move {
    while let Some(line) = rx.recv().await {
      if let Err(e) = write_half.write_all(line.as_bytes()).await {
        debug!(event = "connection_write_failed", conn_id = id, error = %e, "write failed");
        break;
      }
    }
  });

  let ctx = RequestContext::new(conn.clone(), state.broadcaster.clone());
  let mut shutdown_rx = state.shutdown_requested();
  let mut reader = BufReader::new(read_half);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    tokio::select! {
      _ = shutdown_rx.changed() => break,
      read = reader.read_until(b'\n', &mut buf) => {
        match read {
          Ok(0) => break,
          Ok(_) => {
            let line = String::from_utf8_lossy(&buf);
            let Some(resp) = handle_line(&module, &line, &ctx).await else {
              continue;
            };
            match encode_line(&resp) {
              Ok(out) => {
                if !conn.send_line(out).await {
                  break;
                }
              }
              Err(e) => error!(event = "response_encode_failed", conn_id = id, error = %e, "failed to encode response"),
            }
          }
          Err(e) => {
            debug!(event = "connection_read_failed", conn_id = id, error = %e, "read failed");
            break;
          }
        }
      }
    }
  }

  state.broadcaster.detach(id);
  let agent_id = conn.linked_agent_id();
  drop(ctx);
  drop(conn);
  if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
    writer.abort();
  }
  debug!(event = "connection_closed", conn_id = id, agent_id = ?agent_id, "client disconnected");
}
