use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use serde_json::{Value, json};
use switchboard_core::{
  adapters::fs as fsutil,
  config::Config,
  daemon::{Daemon, DaemonError, DaemonHandle},
  logging,
  registry::Agent,
  rpc::DaemonStatus,
};
use test_support::{RpcClient, RpcResp, TempProject, poll_until};

struct TestEnv {
  project: TempProject,
  log_path: PathBuf,
  handle: DaemonHandle,
}

impl TestEnv {
  fn sock(&self) -> PathBuf {
    self.handle.socket_path().to_path_buf()
  }

  async fn client(&self) -> RpcClient {
    RpcClient::connect_when_ready(self.sock(), Duration::from_secs(2)).await
  }
}

static LOG_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

fn ensure_logging_once() -> PathBuf {
  if let Some(p) = LOG_PATH.get() {
    return p.clone();
  }
  let td = tempfile::tempdir().unwrap();
  let log_path = fsutil::logs_path(td.path());
  logging::init(&log_path, switchboard_core::config::LogLevel::Info).unwrap();
  let _ = LOG_DIR.set(td);
  let _ = LOG_PATH.set(log_path.clone());
  log_path
}

async fn start_test_env() -> TestEnv {
  let log_path = ensure_logging_once();
  let project = TempProject::new();
  let handle = switchboard_core::daemon::start(&project.state_dir(), Config::default())
    .await
    .expect("start daemon");
  TestEnv {
    project,
    log_path,
    handle,
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_status_roundtrip() {
  let env = start_test_env().await;
  let mut client = env.client().await;

  let v: RpcResp<DaemonStatus> = client.call("daemon.status", Value::Null).await;
  assert_eq!(v.jsonrpc, "2.0");
  assert!(v.error.is_none(), "unexpected error: {:?}", v.error);
  let status = v.result.expect("has result");
  assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
  assert_eq!(status.pid, std::process::id());
  assert_eq!(status.socket_path, env.sock().display().to_string());
  assert_eq!(status.agents, 0);
  assert_eq!(status.connections, 1);
  assert_eq!(status.queued_commands, 0);

  let pid = std::fs::read_to_string(fsutil::pid_path(&env.project.state_dir())).unwrap();
  assert_eq!(pid, format!("{}\n", std::process::id()));

  // Best-effort: allow logs to flush and check we logged the event if this test owns the logger.
  tokio::time::sleep(Duration::from_millis(100)).await;
  if let Ok(log_text) = std::fs::read_to_string(&env.log_path)
    && !log_text.is_empty()
  {
    assert!(
      log_text.contains("daemon_status"),
      "missing daemon_status log entry; logs: {}",
      log_text
    );
  }

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_method_returns_error() {
  let env = start_test_env().await;
  let mut client = env.client().await;

  let v: RpcResp<Value> = client.call("daemon.nope", Value::Null).await;
  assert!(v.result.is_none());
  let err = v.error.expect("should have error");
  assert_eq!(err.code, -32601);
  assert!(err.message.to_lowercase().contains("method"));

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_lines_keep_connection_open() {
  let env = start_test_env().await;
  let mut client = env.client().await;

  client.send_raw("{this is not json").await;
  let resp: RpcResp<Value> = client.read_response().await;
  assert_eq!(resp.error.expect("parse error").code, -32700);
  assert_eq!(resp.id, Value::Null);

  client.send_raw(r#"[1, 2, 3]"#).await;
  let resp: RpcResp<Value> = client.read_response().await;
  assert_eq!(resp.error.expect("invalid request").code, -32600);

  client.send_raw(r#"{"jsonrpc":"2.0","params":{},"id":"no-method"}"#).await;
  let resp: RpcResp<Value> = client.read_response().await;
  assert_eq!(resp.error.expect("invalid request").code, -32600);
  assert_eq!(resp.id, json!("no-method"));

  // Blank lines are ignored entirely.
  client.send_raw("").await;

  // A null id is still a call, not a notification.
  client
    .send_raw(r#"{"jsonrpc":"2.0","method":"daemon.status","id":null}"#)
    .await;
  let resp: RpcResp<DaemonStatus> = client.read_response().await;
  assert_eq!(resp.id, Value::Null);
  assert!(resp.result.is_some(), "null-id call must be answered: {:?}", resp.error);

  let v: RpcResp<DaemonStatus> = client.call("daemon.status", Value::Null).await;
  assert!(v.error.is_none(), "connection should still serve: {:?}", v.error);

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_params_are_rejected() {
  let env = start_test_env().await;
  let mut client = env.client().await;

  let v: RpcResp<Value> = client.call("register_agent", json!({"name": "only-name"})).await;
  assert_eq!(v.error.expect("invalid params").code, -32602);

  let v: RpcResp<Value> = client
    .call("queue_command", json!({"command": "x", "priority": "high"}))
    .await;
  assert_eq!(v.error.expect("invalid params").code, -32602);

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_notifications_run_without_reply() {
  let env = start_test_env().await;
  let mut client = env.client().await;

  client
    .notify("queue_command", json!({"command": "fire-and-forget"}))
    .await;
  // The next reply on the wire belongs to this call, not the notification.
  let commands: Vec<Value> = client.call_ok("list_commands", json!({})).await;
  assert_eq!(commands.len(), 1);
  assert_eq!(commands[0]["command"], "fire-and-forget");

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handles_multiple_connections() {
  let env = start_test_env().await;
  let mut c1 = env.client().await;
  let mut c2 = env.client().await;
  let mut c3 = env.client().await;

  let (r1, r2, r3) = tokio::join!(
    c1.call::<DaemonStatus>("daemon.status", Value::Null),
    c2.call::<DaemonStatus>("daemon.status", Value::Null),
    c3.call::<DaemonStatus>("daemon.status", Value::Null),
  );
  for r in [r1, r2, r3] {
    assert!(r.error.is_none());
    let s = r.result.unwrap();
    assert!(s.connections >= 1);
    assert_eq!(s.socket_path, env.sock().display().to_string());
  }

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_via_rpc_cleans_up() {
  let env = start_test_env().await;
  let mut client = env.client().await;
  let sock = env.sock();
  let pid_path = fsutil::pid_path(&env.project.state_dir());

  let ok: bool = client.call_ok("daemon.shutdown", Value::Null).await;
  assert!(ok);

  tokio::time::timeout(Duration::from_secs(2), env.handle.wait())
    .await
    .expect("daemon stops after shutdown");
  assert!(!sock.exists(), "socket should be removed");
  assert!(!pid_path.exists(), "pid file should be removed");
  assert!(client.is_closed().await, "connection should be closed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn janitor_evicts_idle_agents_and_stops_on_shutdown() {
  let _ = ensure_logging_once();
  let project = TempProject::new();
  let config = Config {
    stale_agent_timeout_secs: 0,
    cleanup_interval_secs: 1,
    ..Config::default()
  };
  let handle = switchboard_core::daemon::start(&project.state_dir(), config)
    .await
    .expect("start daemon");
  let mut watcher = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;
  let _: Value = watcher
    .call_ok("subscribe", json!({"topics": ["agent.evicted"]}))
    .await;
  let reg: Value = watcher
    .call_ok("register_agent", json!({"name": "idle", "agent_type": "test"}))
    .await;

  let ev = watcher
    .next_event(Duration::from_secs(4))
    .await
    .expect("janitor sweep should evict the idle agent");
  assert_eq!(ev.event, "agent.evicted");
  assert_eq!(ev.data["agent_id"], reg["agent_id"]);
  let agents: Vec<Agent> = watcher.call_ok("list_agents", Value::Null).await;
  assert!(agents.is_empty());

  handle.shutdown();
  tokio::time::timeout(Duration::from_secs(2), handle.wait())
    .await
    .expect("accept loop and janitor stop after shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_daemon_on_same_socket_is_refused() {
  let env = start_test_env().await;
  let _client = env.client().await;

  let second = switchboard_core::daemon::start(&env.project.state_dir(), Config::default()).await;
  match second {
    Err(DaemonError::AlreadyRunning { socket_path }) => assert_eq!(socket_path, env.sock()),
    Err(other) => panic!("expected AlreadyRunning, got {other}"),
    Ok(_) => panic!("second daemon must not start"),
  }

  env.handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_keeps_agents_and_queue_but_not_locks() {
  let _ = ensure_logging_once();
  let project = TempProject::new();
  let state_dir = project.state_dir();

  let handle = switchboard_core::daemon::start(&state_dir, Config::default())
    .await
    .unwrap();
  let mut client = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;
  let reg: Value = client
    .call_ok("register_agent", json!({"name": "keeper", "agent_type": "worker"}))
    .await;
  let agent_id = reg["agent_id"].as_str().unwrap().to_string();
  for (cmd, prio) in [("low", 1), ("high", 9)] {
    let _: Value = client
      .call_ok("queue_command", json!({"command": cmd, "priority": prio}))
      .await;
  }
  let lock: Value = client
    .call_ok("acquire_lock", json!({"agent_id": agent_id, "resource": "Cargo.lock"}))
    .await;
  assert_eq!(lock["acquired"], true);

  let _: bool = client.call_ok("daemon.shutdown", Value::Null).await;
  tokio::time::timeout(Duration::from_secs(2), handle.wait())
    .await
    .unwrap();
  assert!(state_dir.join("agents").join(format!("{agent_id}.json")).exists());
  assert!(state_dir.join("queue.json").exists());

  let handle = switchboard_core::daemon::start(&state_dir, Config::default())
    .await
    .unwrap();
  let mut client = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;
  let agents: Vec<Agent> = client.call_ok("list_agents", Value::Null).await;
  assert_eq!(agents.len(), 1);
  assert_eq!(agents[0].agent_id, agent_id);

  let locks: Vec<Value> = client.call_ok("list_locks", Value::Null).await;
  assert!(locks.is_empty(), "locks must not survive a restart");

  // Priority order is rebuilt from the persisted queue.
  let next: Value = client
    .call_ok("get_next_command", json!({"agent_id": agent_id}))
    .await;
  assert_eq!(next["command"], "high");

  handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_methods_can_broadcast() {
  let _ = ensure_logging_once();
  let project = TempProject::new();
  let mut daemon = Daemon::open(&project.state_dir(), Config::default()).unwrap();

  daemon
    .register_method("file.register", |params, ctx| {
      let path = params.as_value()["path"].clone();
      let sent = ctx.broadcast("file.registered", json!({ "path": path }));
      Ok(json!({ "notified": sent }))
    })
    .unwrap();
  daemon
    .register_async_method("file.slow_echo", |params, _ctx| async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok(params.as_value().clone())
    })
    .unwrap();
  daemon
    .register_method("explode", |_params, _ctx| -> jsonrpsee::core::RpcResult<Value> {
      panic!("domain handler bug")
    })
    .unwrap();

  // Built-ins own their names.
  let dup = daemon.register_method("heartbeat", |_p, _c| Ok(Value::Null));
  assert!(matches!(dup, Err(DaemonError::MethodAlreadyRegistered(_))));

  let handle = daemon.start().await.unwrap();
  let mut watcher = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;
  let mut caller = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;

  let _: Value = watcher
    .call_ok("subscribe", json!({"topics": ["file.*"]}))
    .await;

  let res: Value = caller
    .call_ok("file.register", json!({"path": "src/main.rs"}))
    .await;
  assert_eq!(res["notified"], 1);
  let ev = watcher
    .next_event(Duration::from_secs(2))
    .await
    .expect("file.registered event");
  assert_eq!(ev.event, "file.registered");
  assert_eq!(ev.data["path"], "src/main.rs");

  let echoed: Value = caller.call_ok("file.slow_echo", json!({"x": 1})).await;
  assert_eq!(echoed, json!({"x": 1}));

  // A panicking handler yields an internal error and the connection survives.
  let boom: RpcResp<Value> = caller.call("explode", Value::Null).await;
  assert_eq!(boom.error.expect("internal error").code, -32603);
  let status: RpcResp<DaemonStatus> = caller.call("daemon.status", Value::Null).await;
  assert!(status.error.is_none());

  handle.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_broadcast_from_outside_handlers() {
  let _ = ensure_logging_once();
  let project = TempProject::new();
  let daemon = Daemon::open(&project.state_dir(), Config::default()).unwrap();
  let broadcaster = daemon.broadcaster().clone();
  let handle = daemon.start().await.unwrap();

  let mut client = RpcClient::connect_when_ready(handle.socket_path(), Duration::from_secs(2)).await;
  let _: Value = client.call_ok("subscribe", json!({"topics": ["*"]})).await;

  let reached = poll_until(Duration::from_secs(2), Duration::from_millis(20), || {
    let b = broadcaster.clone();
    async move { b.connection_count() == 1 }
  })
  .await;
  assert!(reached);

  assert_eq!(broadcaster.broadcast("build.finished", json!({"ok": true})), 1);
  let ev = client.next_event(Duration::from_secs(2)).await.unwrap();
  assert_eq!(ev.event, "build.finished");
  assert_eq!(ev.data, json!({"ok": true}));

  handle.stop();
}
