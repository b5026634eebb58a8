//! The node executor capability.

use async_trait::async_trait;
use montage_workflow::NodeType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::artifact::{Artifact, CharacterRef, ImageRef};
use crate::error::NodeError;
use crate::queue::QueueItem;

/// Everything an executor sees about one node, after template resolution
/// and slot filling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeInput {
  pub execution_id: String,
  pub node_id: String,
  pub node_name: String,
  /// Node config with templates resolved.
  pub params: Map<String, Value>,
  pub reference_images: Vec<ImageRef>,
  pub character_references: Vec<CharacterRef>,
}

impl NodeInput {
  pub fn new(node_id: impl Into<String>) -> Self {
    let node_id = node_id.into();
    Self {
      node_name: node_id.clone(),
      node_id,
      ..Default::default()
    }
  }

  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn with_image(mut self, image: ImageRef) -> Self {
    self.reference_images.push(image);
    self
  }

  pub fn str_param(&self, key: &str) -> Option<&str> {
    self.params.get(key).and_then(Value::as_str)
  }

  /// A string parameter that must be present and not blank.
  pub fn required_str(&self, key: &str) -> Result<&str, NodeError> {
    match self.str_param(key) {
      Some(value) if !value.trim().is_empty() => Ok(value),
      _ => Err(NodeError::configuration(format!("'{}' is required", key))),
    }
  }

  /// Deserialize the params into a typed struct.
  pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
    serde_json::from_value(Value::Object(self.params.clone()))
      .map_err(|e| NodeError::configuration(format!("invalid parameters: {}", e)))
  }
}

/// What a backend returned for a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
  /// Synchronous protocols answer with the artifact directly.
  Completed(Artifact),
  /// Job protocols answer with a queue item to poll.
  Queued(QueueItem),
}

/// Executes one kind of node.
///
/// The registry calls [`prepare`](NodeExecutor::prepare) first so that
/// missing inputs fail before any backend is contacted, then
/// [`submit`](NodeExecutor::submit), then [`poll`](NodeExecutor::poll) until
/// the job is terminal when the submission was queued.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
  fn node_type(&self) -> NodeType;

  /// Whether submissions are jobs that need polling.
  fn is_async(&self) -> bool {
    false
  }

  /// Validate the input and build the request body.
  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError>;

  async fn submit(&self, input: &NodeInput, request: &Value) -> Result<Submission, NodeError>;

  async fn poll(&self, job_id: &str) -> Result<QueueItem, NodeError> {
    Err(NodeError::configuration(format!(
      "{} does not support polling (job '{}')",
      self.node_type(),
      job_id
    )))
  }

  /// Turn a completed job into the node's artifact.
  fn complete(&self, item: &QueueItem) -> Result<Artifact, NodeError> {
    Ok(Artifact::Json(
      item.output_payload.clone().unwrap_or(Value::Null),
    ))
  }
}
