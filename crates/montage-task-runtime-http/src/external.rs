use async_trait::async_trait;
use montage_host_http::Endpoint;
use montage_task_runtime::{
  Artifact, ImageRef, NodeError, NodeExecutor, NodeInput, QueueItem, Submission,
};
use montage_workflow::NodeType;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::backend::{fetch_status, parse_submission, post, str_field};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExternalParams {
  #[serde(default, alias = "workflow_name")]
  workflow_name: String,
  /// The sub-graph, either as JSON or as a JSON string.
  #[serde(default, alias = "workflow_json")]
  workflow_json: Value,
  #[serde(default)]
  prompt: String,
}

/// Hands a user-supplied graph to an external job runner.
pub struct ExternalWorkflowExecutor {
  endpoint: Endpoint,
}

impl ExternalWorkflowExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

fn input_image(image: &ImageRef) -> Value {
  let mut map = Map::new();
  if let Some(path) = &image.storage_path {
    map.insert("storagePath".to_string(), Value::String(path.clone()));
  }
  if let Some(source) = image.source() {
    map.insert("imageData".to_string(), Value::String(source.to_string()));
  }
  Value::Object(map)
}

#[async_trait]
impl NodeExecutor for ExternalWorkflowExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::ExternalJobWorkflow
  }

  fn is_async(&self) -> bool {
    true
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params: ExternalParams = input.params_as()?;
    if params.workflow_name.trim().is_empty() {
      return Err(NodeError::configuration("'workflow_name' is required"));
    }
    let empty = match &params.workflow_json {
      Value::Null => true,
      Value::String(s) => s.trim().is_empty(),
      Value::Object(map) => map.is_empty(),
      _ => false,
    };
    if empty {
      return Err(NodeError::configuration("'workflow_json' is required"));
    }

    let images: Vec<Value> = input.reference_images.iter().map(input_image).collect();
    Ok(json!({
      "workflowName": params.workflow_name,
      "workflowJson": params.workflow_json,
      "prompt": params.prompt,
      "inputImages": images,
    }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let body = post(&self.endpoint, request).await?;
    Ok(Submission::Queued(parse_submission(&body)?))
  }

  async fn poll(&self, job_id: &str) -> Result<QueueItem, NodeError> {
    fetch_status(&self.endpoint, job_id).await
  }

  /// The first output image when the runner produced images, else the raw
  /// `outputs` map.
  fn complete(&self, item: &QueueItem) -> Result<Artifact, NodeError> {
    let payload = item.output_payload.clone().unwrap_or(Value::Null);

    let first_image = payload
      .get("outputImages")
      .and_then(Value::as_array)
      .and_then(|images| images.first());
    if let Some(image) = first_image {
      return Ok(Artifact::Image(ImageRef {
        image_data: str_field(image, &["data", "imageData"]).map(str::to_string),
        image_url: str_field(image, &["url", "imageUrl"]).map(str::to_string),
        mime_type: str_field(image, &["mimeType"]).map(str::to_string),
        storage_path: str_field(image, &["storagePath"]).map(str::to_string),
        job_id: Some(item.id.clone()),
      }));
    }

    Ok(Artifact::Json(
      payload.get("outputs").cloned().unwrap_or(payload),
    ))
  }
}
