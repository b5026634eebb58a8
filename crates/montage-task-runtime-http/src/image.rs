use async_trait::async_trait;
use montage_host_http::Endpoint;
use montage_task_runtime::{
  Artifact, ImageRef, NodeError, NodeExecutor, NodeInput, QueueItem, Submission,
};
use montage_workflow::NodeType;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{fetch_status, image_sources, missing_field, parse_submission, post, str_field};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageParams {
  #[serde(default)]
  prompt: String,
  #[serde(default)]
  model: Option<String>,
  #[serde(default, alias = "aspect_ratio")]
  aspect_ratio: Option<String>,
  #[serde(default)]
  quality: Option<String>,
}

impl ImageParams {
  fn from_input(input: &NodeInput) -> Result<Self, NodeError> {
    let params: Self = input.params_as()?;
    if params.prompt.trim().is_empty() {
      return Err(NodeError::configuration("'prompt' is required"));
    }
    Ok(params)
  }
}

/// Fast image generation answered in one call.
pub struct ImageGenerationExecutor {
  endpoint: Endpoint,
}

impl ImageGenerationExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

#[async_trait]
impl NodeExecutor for ImageGenerationExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::ImageGeneration
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params = ImageParams::from_input(input)?;
    Ok(json!({
      "prompt": params.prompt,
      "model": params.model.unwrap_or_else(|| "gemini-2.5-flash-image".to_string()),
      "aspectRatio": params.aspect_ratio.unwrap_or_else(|| "16:9".to_string()),
      "referenceImages": image_sources(&input.reference_images),
    }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let body = post(&self.endpoint, request).await?;
    let data = str_field(&body, &["imageData"]).ok_or_else(|| {
      let mut err = missing_field("imageData", &body);
      if let NodeError::Backend { message, .. } = &mut err {
        message.push_str("; the prompt may have been blocked by safety filters");
      }
      err
    })?;

    Ok(Submission::Completed(Artifact::Image(ImageRef {
      image_data: Some(data.to_string()),
      mime_type: Some(str_field(&body, &["mimeType"]).unwrap_or("image/png").to_string()),
      storage_path: str_field(&body, &["storagePath"]).map(str::to_string),
      ..Default::default()
    })))
  }
}

/// Job-based image generation: submit, then poll `{url}/{id}`.
pub struct ImageJobExecutor {
  endpoint: Endpoint,
}

impl ImageJobExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

#[async_trait]
impl NodeExecutor for ImageJobExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::ImageGenerationJob
  }

  fn is_async(&self) -> bool {
    true
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params = ImageParams::from_input(input)?;
    Ok(json!({
      "prompt": params.prompt,
      "aspectRatio": params.aspect_ratio.unwrap_or_else(|| "4:3".to_string()),
      "quality": params.quality.unwrap_or_else(|| "Basic".to_string()),
      "referenceImages": image_sources(&input.reference_images),
    }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let body = post(&self.endpoint, request).await?;
    Ok(Submission::Queued(parse_submission(&body)?))
  }

  async fn poll(&self, job_id: &str) -> Result<QueueItem, NodeError> {
    fetch_status(&self.endpoint, job_id).await
  }

  fn complete(&self, item: &QueueItem) -> Result<Artifact, NodeError> {
    let payload = item.output_payload.clone().unwrap_or(Value::Null);
    let url = str_field(&payload, &["imageUrl", "url"]).ok_or_else(|| missing_field("imageUrl", &payload))?;
    let job_id = str_field(&payload, &["jobId"]).unwrap_or(item.id.as_str());

    Ok(Artifact::Image(ImageRef {
      image_url: Some(url.to_string()),
      storage_path: str_field(&payload, &["storagePath"]).map(str::to_string),
      job_id: Some(job_id.to_string()),
      ..Default::default()
    }))
  }
}
