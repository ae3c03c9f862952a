use super::types::{Config, ConfigError, Result};

pub(super) fn validate(cfg: &Config) -> Result<()> {
  if cfg.lock_poll_interval_ms == 0 {
    return Err(ConfigError::MustBePositive {
      field: "lock_poll_interval_ms",
    });
  }
  if cfg.outbound_queue_capacity == 0 {
    return Err(ConfigError::MustBePositive {
      field: "outbound_queue_capacity",
    });
  }
  Ok(())
}
