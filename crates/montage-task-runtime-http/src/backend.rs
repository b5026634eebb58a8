//! Shared request/response handling for backend executors.

use montage_host_http::Endpoint;
use montage_task_runtime::{ImageRef, NodeError, QueueItem, QueueStatus};
use serde_json::Value;

/// POST `request` and unwrap the `{ success, error }` envelope some
/// backends use even on 2xx responses.
pub(crate) async fn post(endpoint: &Endpoint, request: &Value) -> Result<Value, NodeError> {
  let body = endpoint.post(request).await?;
  check_envelope(body)
}

pub(crate) fn check_envelope(body: Value) -> Result<Value, NodeError> {
  if body.get("success").and_then(Value::as_bool) == Some(false) {
    let message = str_field(&body, &["error", "message"])
      .unwrap_or("backend reported failure")
      .to_string();
    return Err(NodeError::Backend {
      message,
      details: Some(body),
    });
  }
  Ok(body)
}

/// Parse a job submission response: `{ id }` or `{ queueItemId }`.
pub(crate) fn parse_submission(body: &Value) -> Result<QueueItem, NodeError> {
  let id = ["id", "queueItemId", "jobId"]
    .iter()
    .filter_map(|key| body.get(*key))
    .find_map(id_string)
    .ok_or_else(|| NodeError::Backend {
      message: "job submission returned no id".to_string(),
      details: Some(body.clone()),
    })?;

  let status = body
    .get("status")
    .cloned()
    .and_then(|s| serde_json::from_value(s).ok())
    .unwrap_or(QueueStatus::Pending);

  Ok(QueueItem::new(id, status))
}

/// `GET {url}/{id}` and parse it as a queue item.
///
/// When a completed job carries no `output`/`outputPayload`, the whole
/// response body is used as the payload.
pub(crate) async fn fetch_status(endpoint: &Endpoint, job_id: &str) -> Result<QueueItem, NodeError> {
  let body = endpoint.get_child(job_id).await?;
  let mut item: QueueItem = serde_json::from_value(body.clone()).map_err(|e| NodeError::Backend {
    message: format!("invalid job status: {}", e),
    details: Some(body.clone()),
  })?;

  if item.id.is_empty() {
    item.id = job_id.to_string();
  }
  if item.status == QueueStatus::Completed && item.output_payload.is_none() {
    item.output_payload = Some(body);
  }
  Ok(item)
}

fn id_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// First non-empty string field among `keys`.
pub(crate) fn str_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
  keys
    .iter()
    .filter_map(|key| body.get(*key).and_then(Value::as_str))
    .find(|s| !s.is_empty())
}

/// Reference images as backends accept them: inline data or URL.
pub(crate) fn image_sources(images: &[ImageRef]) -> Vec<Value> {
  images
    .iter()
    .filter_map(ImageRef::source)
    .map(|s| Value::String(s.to_string()))
    .collect()
}

pub(crate) fn missing_field(field: &str, body: &Value) -> NodeError {
  NodeError::Backend {
    message: format!("backend response has no '{}'", field),
    details: Some(body.clone()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_envelope_failure() {
    let err = check_envelope(json!({ "success": false, "error": "quota" })).unwrap_err();
    assert_eq!(err.to_string(), "quota");
    assert_eq!(err.details().unwrap()["success"], false);

    assert!(check_envelope(json!({ "success": true })).is_ok());
    assert!(check_envelope(json!({ "text": "no envelope" })).is_ok());
  }

  #[test]
  fn test_submission_id_forms() {
    assert_eq!(parse_submission(&json!({ "id": "a" })).unwrap().id, "a");
    let item = parse_submission(&json!({ "queueItemId": 42, "status": "queued" })).unwrap();
    assert_eq!(item.id, "42");
    assert_eq!(item.status, QueueStatus::Queued);
    assert!(parse_submission(&json!({ "success": true })).is_err());
  }
}
