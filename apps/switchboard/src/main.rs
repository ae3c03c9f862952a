mod args;

use anyhow::Context;
use clap::Parser;
use switchboard_core::adapters::fs as fsutil;
use switchboard_core::{config, daemon, logging};

fn main() -> anyhow::Result<()> {
  let cli = args::Cli::parse();
  match cli.command {
    args::Commands::Run(run) => run_daemon(run),
  }
}

fn run_daemon(run: args::RunArgs) -> anyhow::Result<()> {
  let root = match run.root {
    Some(root) => root,
    None => std::env::current_dir().context("resolve current directory")?,
  };
  let state_dir = fsutil::state_dir(&root);
  let mut cfg = config::load(Some(&state_dir)).context("load config")?;
  if let Some(socket) = run.socket {
    cfg.socket_path = Some(socket);
  }
  // Initialize structured logging early
  logging::init(&fsutil::logs_path(&state_dir), cfg.log_level).context("open log file")?;

  let rt = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("build tokio runtime")?;
  rt.block_on(async move {
    let handle = daemon::start(&state_dir, cfg)
      .await
      .context("start daemon")?;
    println!("switchboard: listening on {}", handle.socket_path().display());

    let state = handle.state().clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        state.request_shutdown();
      }
    });
    handle.wait().await;
    println!("switchboard: stopped");
    anyhow::Ok(())
  })
}
