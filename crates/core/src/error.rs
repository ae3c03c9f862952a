use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;

/// Generic error code for handler and domain failures.
pub const DOMAIN_ERROR: i32 = -32000;
pub const AGENT_NOT_FOUND: i32 = -32001;
pub const COMMAND_NOT_FOUND: i32 = -32002;
pub const COMMAND_ALREADY_COMPLETED: i32 = -32003;

/// Errors raised by the registry, queue and lock components.
#[derive(Debug, Error)]
pub enum CoordError {
  #[error("agent not found: {0}")]
  AgentNotFound(String),
  #[error("command not found: {0}")]
  CommandNotFound(String),
  #[error("command already completed: {0}")]
  CommandAlreadyCompleted(String),
}

impl CoordError {
  pub fn code(&self) -> i32 {
    match self {
      CoordError::AgentNotFound(_) => AGENT_NOT_FOUND,
      CoordError::CommandNotFound(_) => COMMAND_NOT_FOUND,
      CoordError::CommandAlreadyCompleted(_) => COMMAND_ALREADY_COMPLETED,
    }
  }
}

impl From<CoordError> for ErrorObjectOwned {
  fn from(err: CoordError) -> Self {
    ErrorObjectOwned::owned(err.code(), err.to_string(), None::<()>)
  }
}

/// Wrap any displayable error as a generic `-32000` RPC error.
pub fn domain_error(err: impl std::fmt::Display) -> ErrorObjectOwned {
  ErrorObjectOwned::owned(DOMAIN_ERROR, err.to_string(), None::<()>)
}
