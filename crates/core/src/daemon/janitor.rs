use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::state::DaemonState;

/// Periodically evict stale agents until shutdown is signalled.
pub(super) fn spawn(
  state: Arc<DaemonState>,
  period: Duration,
  mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
  let timeout = state.config.stale_agent_timeout();
  info!(event = "janitor_started", period_secs = period.as_secs(), timeout_secs = timeout.as_secs(), "stale agent sweep scheduled");
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    ticker.tick().await;
    loop {
      tokio::select! {
        _ = shutdown_rx.changed() => break,
        _ = ticker.tick() => {
          let evicted = state.evict_stale(timeout);
          debug!(event = "janitor_sweep", evicted = evicted.len(), "stale agent sweep done");
        }
      }
    }
    debug!(event = "janitor_stopped", "stale agent sweep stopped");
  })
}
