use async_trait::async_trait;
use montage_host_http::Endpoint;
use montage_task_runtime::{Artifact, NodeError, NodeExecutor, NodeInput, Submission};
use montage_workflow::NodeType;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{image_sources, missing_field, post, str_field};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Deserialize)]
struct TextParams {
  #[serde(default)]
  prompt: String,
  #[serde(default)]
  model: Option<String>,
}

/// LLM text generation. Upstream images are sent along for multimodal
/// prompts.
pub struct TextGenerationExecutor {
  endpoint: Endpoint,
}

impl TextGenerationExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

#[async_trait]
impl NodeExecutor for TextGenerationExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::TextGeneration
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params: TextParams = input.params_as()?;
    if params.prompt.trim().is_empty() {
      return Err(NodeError::configuration("'prompt' is required"));
    }
    Ok(json!({
      "prompt": params.prompt,
      "model": params.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
      "images": image_sources(&input.reference_images),
    }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let body = post(&self.endpoint, request).await?;
    let text = str_field(&body, &["text", "response"]).ok_or_else(|| missing_field("text", &body))?;
    Ok(Submission::Completed(Artifact::text(text)))
  }
}
