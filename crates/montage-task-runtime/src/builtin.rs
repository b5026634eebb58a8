//! Input nodes. They republish author-supplied data and never call a backend.

use async_trait::async_trait;
use montage_workflow::NodeType;
use serde_json::{Map, Value, json};

use crate::artifact::{Artifact, CharacterRef, ImageRef};
use crate::error::NodeError;
use crate::executor::{NodeExecutor, NodeInput, Submission};

/// First non-empty string among `keys`. Configs from older editors use
/// camelCase keys, newer ones snake_case.
fn first_str(params: &Map<String, Value>, keys: &[&str]) -> Option<String> {
  keys
    .iter()
    .filter_map(|k| params.get(*k).and_then(Value::as_str))
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

fn image_from_params(params: &Map<String, Value>) -> ImageRef {
  ImageRef {
    image_data: first_str(params, &["image_data", "imageData"]),
    image_url: first_str(params, &["image_url", "imageUrl"]),
    mime_type: first_str(params, &["mime_type", "mimeType"]),
    storage_path: first_str(params, &["storage_path", "storagePath"]),
    job_id: None,
  }
}

/// Static text. An empty text is a valid output.
pub struct TextInputExecutor;

#[async_trait]
impl NodeExecutor for TextInputExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::TextInput
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let text = first_str(&input.params, &["text", "prompt"]).unwrap_or_default();
    Ok(json!({ "text": text }))
  }

  async fn submit(&self, _input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let text = request["text"].as_str().unwrap_or_default();
    Ok(Submission::Completed(Artifact::text(text)))
  }
}

/// Static image. A node with no image still succeeds with an empty image.
pub struct StaticImageExecutor;

#[async_trait]
impl NodeExecutor for StaticImageExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::StaticImageInput
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    // Image bytes stay out of recorded request bodies.
    let image = image_from_params(&input.params);
    let marker = if image.image_data.is_some() {
      Value::String("(image data)".to_string())
    } else {
      image.image_url.map(Value::String).unwrap_or(Value::Null)
    };
    Ok(json!({ "imageData": marker }))
  }

  async fn submit(&self, input: &NodeInput, _request: &Value) -> Result<Submission, NodeError> {
    Ok(Submission::Completed(Artifact::Image(image_from_params(
      &input.params,
    ))))
  }
}

/// A character sheet picked from master data.
pub struct StaticCharacterExecutor;

#[async_trait]
impl NodeExecutor for StaticCharacterExecutor {
  fn node_type(&self) -> NodeType {
    NodeType::StaticCharacterReference
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let name = first_str(&input.params, &["character_name", "characterName", "name"])
      .ok_or_else(|| NodeError::configuration("a character must be selected"))?;
    Ok(json!({ "characterName": name }))
  }

  async fn submit(&self, input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    let name = request["characterName"]
      .as_str()
      .unwrap_or_default()
      .to_string();
    let image = image_from_params(&input.params);
    let image = (!image.is_empty()).then_some(image);
    Ok(Submission::Completed(Artifact::Character(CharacterRef {
      name,
      image,
    })))
  }
}
