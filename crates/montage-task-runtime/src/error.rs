//! Node-level errors.
//!
//! A [`NodeError`] fails exactly one node. It is recorded in that node's
//! result and never stops the rest of the run.

use std::time::Duration;

use montage_host_http::HttpError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
  /// A required input is missing or malformed.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The backend rejected the request or reported a failed job.
  #[error("{message}")]
  Backend {
    message: String,
    details: Option<serde_json::Value>,
  },

  /// The backend could not be reached. Status polls retry these.
  #[error("backend unreachable: {0}")]
  Transport(String),

  /// The job never reached a terminal status within the poll budget.
  #[error(
    "timed out waiting for job: still running after {attempts} polls ({elapsed:?}){}",
    .last_error.as_deref().map(|e| format!(", last poll error: {e}")).unwrap_or_default()
  )]
  Timeout {
    attempts: u32,
    elapsed: Duration,
    last_error: Option<String>,
  },

  #[error("unknown node type '{0}'")]
  UnknownType(String),

  #[error("node execution cancelled")]
  Cancelled,
}

/// Error class of a [`NodeError`], stored with results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Configuration,
  Backend,
  Transport,
  Timeout,
  UnknownType,
  Cancelled,
}

impl NodeError {
  pub fn configuration(message: impl Into<String>) -> Self {
    NodeError::Configuration(message.into())
  }

  pub fn backend(message: impl Into<String>) -> Self {
    NodeError::Backend {
      message: message.into(),
      details: None,
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      NodeError::Configuration(_) => ErrorKind::Configuration,
      NodeError::Backend { .. } => ErrorKind::Backend,
      NodeError::Transport(_) => ErrorKind::Transport,
      NodeError::Timeout { .. } => ErrorKind::Timeout,
      NodeError::UnknownType(_) => ErrorKind::UnknownType,
      NodeError::Cancelled => ErrorKind::Cancelled,
    }
  }

  /// Whether polling the same job again may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, NodeError::Transport(_))
  }

  /// Raw backend details, if the backend sent any.
  pub fn details(&self) -> Option<&serde_json::Value> {
    match self {
      NodeError::Backend { details, .. } => details.as_ref(),
      _ => None,
    }
  }
}

impl From<HttpError> for NodeError {
  fn from(err: HttpError) -> Self {
    match err {
      HttpError::Status { message, body, .. } => NodeError::Backend {
        message,
        details: Some(body),
      },
      HttpError::Transport(message) => NodeError::Transport(message),
      other => NodeError::Backend {
        message: other.to_string(),
        details: None,
      },
    }
  }
}
