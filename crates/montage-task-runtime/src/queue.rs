use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status of a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
  Pending,
  Queued,
  #[serde(alias = "running", alias = "in_progress")]
  Processing,
  #[serde(alias = "succeeded", alias = "success")]
  Completed,
  #[serde(alias = "error")]
  Failed,
}

impl QueueStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, QueueStatus::Completed | QueueStatus::Failed)
  }
}

/// A backend job record as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
  #[serde(default, deserialize_with = "string_or_number")]
  pub id: String,
  pub status: QueueStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input_payload: Option<Value>,
  #[serde(default, alias = "output", skip_serializing_if = "Option::is_none")]
  pub output_payload: Option<Value>,
  #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
}

impl QueueItem {
  pub fn new(id: impl Into<String>, status: QueueStatus) -> Self {
    Self {
      id: id.into(),
      status,
      input_payload: None,
      output_payload: None,
      error_message: None,
    }
  }

  pub fn with_output(mut self, output: Value) -> Self {
    self.output_payload = Some(output);
    self
  }

  pub fn with_error(mut self, message: impl Into<String>) -> Self {
    self.error_message = Some(message.into());
    self
  }
}

/// Job ids are strings for some backends and integers for others.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    Value::Null => Ok(String::new()),
    other => Err(serde::de::Error::custom(format!(
      "expected a string or number id, got {}",
      other
    ))),
  }
}
