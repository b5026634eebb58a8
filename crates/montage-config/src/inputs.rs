use serde::{Deserialize, Serialize};

/// Request-level inputs applied to a workflow before it runs.
///
/// - `text` is written into every `text-input` node.
/// - `prompt` replaces `{{input}}` inside generation prompts.
/// - `images[i]` (base64 or URL) fills the i-th `static-image-input` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInputs {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prompt: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub images: Vec<String>,
}

impl WorkflowInputs {
  pub fn is_empty(&self) -> bool {
    self.text.is_none() && self.prompt.is_none() && self.images.is_empty()
  }
}
