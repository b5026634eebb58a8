use async_trait::async_trait;
use montage_host_http::Endpoint;
use montage_task_runtime::{Artifact, NodeError, NodeExecutor, NodeInput, QueueItem, Submission};
use montage_workflow::NodeType;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{fetch_status, missing_field, parse_submission, post, str_field};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoParams {
  #[serde(default)]
  prompt: String,
  #[serde(default, alias = "negative_prompt")]
  negative_prompt: String,
  #[serde(default)]
  duration: Option<f64>,
  #[serde(default, alias = "cfg_scale")]
  cfg_scale: Option<f64>,
  #[serde(default, alias = "prompt_enhancement")]
  prompt_enhancement: Option<bool>,
}

/// Image-to-video generation. Needs exactly one reference image.
pub struct VideoGenerationExecutor {
  endpoint: Endpoint,
}

impl VideoGenerationExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

#[async_trait]
impl NodeExecutor for VideoGenerationExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::VideoGeneration
  }

  fn is_async(&self) -> bool {
    true
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params: VideoParams = input.params_as()?;
    let image = input
      .reference_images
      .iter()
      .find_map(|image| image.source())
      .ok_or_else(|| NodeError::configuration("a reference image is required"))?;

    Ok(json!({
      "prompt": params.prompt,
      "negativePrompt": params.negative_prompt,
      "duration": params.duration.unwrap_or(5.0),
      "cfgScale": params.cfg_scale.unwrap_or(1.0),
      "promptEnhancement": params.prompt_enhancement.unwrap_or(true),
      "imageData": image,
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
    let url = str_field(&payload, &["videoUrl", "url"]).ok_or_else(|| missing_field("videoUrl", &payload))?;

    Ok(Artifact::Video {
      url: url.to_string(),
      job_id: Some(str_field(&payload, &["jobId"]).unwrap_or(item.id.as_str()).to_string()),
      duration: payload.get("duration").and_then(Value::as_f64),
    })
  }
}
