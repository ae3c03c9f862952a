use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::LogLevel;
use tracing::{info, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

static WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn level_directive(level: LogLevel) -> &'static str {
  match level {
    LogLevel::Off => "off",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug",
    LogLevel::Trace => "trace",
  }
}

/// Initialize structured JSON logging to `logs.jsonl`.
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice keeps
/// the first subscriber; only opening the log file can fail.
pub fn init(logs_path: &Path, level: LogLevel) -> io::Result<()> {
  if let Some(parent) = logs_path.parent() {
    fs::create_dir_all(parent)?;
  }

  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(logs_path)?;

  // Keep the guard alive for the whole process so buffered lines are flushed.
  let (nb_writer, guard) = tracing_appender::non_blocking(file);
  let _ = WORKER_GUARD.set(guard);

  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

  let json_layer = fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .json()
    .with_current_span(true)
    .with_span_list(true)
    .with_level(true)
    .with_target(false)
    .with_thread_ids(false)
    .with_thread_names(false)
    .with_writer(move || nb_writer.clone());

  let subscriber = Registry::default().with(filter).with(json_layer);

  // Already set by an earlier call (tests, embedding hosts)
  let _ = set_global_default(subscriber);

  info!(
    event = "logging_initialized",
    logs_path = %logs_path.display(),
    level = ?level,
    "logging initialized"
  );
  Ok(())
}
