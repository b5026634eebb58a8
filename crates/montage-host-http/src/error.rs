use thiserror::Error;

/// Errors from a backend HTTP call.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
  /// The backend answered with a non-success status.
  #[error("backend returned status {status}: {message}")]
  Status {
    status: u16,
    message: String,
    body: serde_json::Value,
  },

  /// The request never produced a response.
  #[error("transport error: {0}")]
  Transport(String),

  /// The response body was not the JSON we expected.
  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },
}

impl From<reqwest::Error> for HttpError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      HttpError::Decode(err.to_string())
    } else {
      HttpError::Transport(err.to_string())
    }
  }
}
