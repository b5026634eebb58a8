use async_trait::async_trait;
use montage_host_http::Endpoint;
use montage_task_runtime::{Artifact, NodeError, NodeExecutor, NodeInput, Submission};
use montage_workflow::NodeType;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{missing_field, post, str_field};

const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";
const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2_5";
const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechParams {
  #[serde(default)]
  text: String,
  /// Accepted when text is wired through the prompt slot.
  #[serde(default)]
  prompt: String,
  #[serde(default, alias = "voice_id")]
  voice_id: Option<String>,
  #[serde(default, alias = "model_id")]
  model_id: Option<String>,
}

/// Text to speech.
pub struct SpeechSynthesisExecutor {
  endpoint: Endpoint,
}

impl SpeechSynthesisExecutor {
  pub fn new(endpoint: Endpoint) -> Self {
    Self { endpoint }
  }
}

#[async_trait]
impl NodeExecutor for SpeechSynthesisExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::SpeechSynthesis
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let params: SpeechParams = input.params_as()?;
    let text = if params.text.trim().is_empty() {
      params.prompt
    } else {
      params.text
    };
    if text.trim().is_empty() {
      return Err(NodeError::configuration("'text' is required"));
    }
    Ok(json!({
      "text": text,
      "voiceId": params.voice_id.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
      "modelId": params.model_id.unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
    }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let body = post(&self.endpoint, request).await?;
    let data = str_field(&body, &["audioData"]).ok_or_else(|| missing_field("audioData", &body))?;
    let mime_type = str_field(&body, &["mimeType"]).unwrap_or(DEFAULT_MIME_TYPE);
    Ok(Submission::Completed(Artifact::Audio {
      data: data.to_string(),
      mime_type: mime_type.to_string(),
    }))
  }
}
