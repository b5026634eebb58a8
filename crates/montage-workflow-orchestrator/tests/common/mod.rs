#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use montage_config::{EdgeDef, NodeDef, PollSettings, WorkflowDef};
use montage_store::{OutputPersister, OutputRecord, StoreError};
use montage_task_runtime::{
  Artifact, ExecutorRegistry, ImageRef, NodeError, NodeExecutor, NodeInput, QueueItem,
  QueueStatus, Submission,
};
use montage_workflow::{NodeType, Workflow};
use serde_json::{Value, json};

/// Node ids in the order executors saw them.
#[derive(Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
  pub fn record(&self, node_id: &str) {
    self.0.lock().unwrap().push(node_id.to_string());
  }

  pub fn calls(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

/// Text generation that answers with its prompt. Prompts containing
/// `FAIL` are rejected by the "backend".
pub struct EchoText(pub Arc<CallLog>);

#[async_trait]
impl NodeExecutor for EchoText {
  fn node_type(&self) -> NodeType {
    NodeType::TextGeneration
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let prompt = input.required_str("prompt")?;
    Ok(json!({ "prompt": prompt, "model": "fake" }))
  }

  async fn submit(&self, input: &NodeInput, request: &Value) -> Result<Submission, NodeError> {
    self.0.record(&input.node_id);
    let prompt = request["prompt"].as_str().unwrap_or_default();
    if prompt.contains("FAIL") {
      return Err(NodeError::Backend {
        message: "prompt rejected".to_string(),
        details: Some(json!({ "error": "prompt rejected", "finishReason": "SAFETY" })),
      });
    }
    Ok(Submission::Completed(Artifact::text(prompt)))
  }
}

/// Image generation that "stores" one image per node. With
/// `"inline": true` the image only comes back as data.
pub struct FakeImage(pub Arc<CallLog>);

#[async_trait]
impl NodeExecutor for FakeImage {
  fn node_type(&self) -> NodeType {
    NodeType::ImageGeneration
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let prompt = input.required_str("prompt")?;
    Ok(json!({
      "prompt": prompt,
      "aspectRatio": input.str_param("aspectRatio").unwrap_or("16:9"),
      "referenceImages": input.reference_images.iter().filter_map(ImageRef::source).collect::<Vec<_>>(),
    }))
  }

  async fn submit(&self, input: &NodeInput, _request: &Value) -> Result<Submission, NodeError> {
    self.0.record(&input.node_id);
    Ok(Submission::Completed(Artifact::Image(ImageRef {
      image_data: Some("AAAA".to_string()),
      mime_type: Some("image/png".to_string()),
      storage_path: (input.params.get("inline") != Some(&Value::Bool(true)))
        .then(|| format!("outputs/{}.png", input.node_id)),
      ..Default::default()
    })))
  }
}

/// Video job that never finishes.
pub struct StuckVideo(pub Arc<CallLog>);

#[async_trait]
impl NodeExecutor for StuckVideo {
  fn node_type(&self) -> NodeType {
    NodeType::VideoGeneration
  }

  fn is_async(&self) -> bool {
    true
  }

  fn prepare(&self, _input: &NodeInput) -> Result<Value, NodeError> {
    Ok(json!({ "duration": 5 }))
  }

  async fn submit(&self, input: &NodeInput, _request: &Value) -> Result<Submission, NodeError> {
    self.0.record(&input.node_id);
    Ok(Submission::Queued(QueueItem::new("job-1", QueueStatus::Queued)))
  }

  async fn poll(&self, job_id: &str) -> Result<QueueItem, NodeError> {
    Ok(QueueItem::new(job_id, QueueStatus::Processing))
  }
}

pub fn registry(log: &Arc<CallLog>) -> Arc<ExecutorRegistry> {
  let mut registry = ExecutorRegistry::with_builtins(PollSettings::default());
  registry.register(Arc::new(EchoText(log.clone())));
  registry.register(Arc::new(FakeImage(log.clone())));
  registry.register(Arc::new(StuckVideo(log.clone())));
  Arc::new(registry)
}

pub fn def(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> WorkflowDef {
  WorkflowDef {
    workflow_id: "wf-1".to_string(),
    name: "Test".to_string(),
    nodes,
    edges,
  }
}

pub fn workflow(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> Workflow {
  Workflow::from_def(def(nodes, edges)).unwrap()
}

/// Keeps every record it is handed.
#[derive(Default)]
pub struct RecordingPersister(Mutex<Vec<OutputRecord>>);

impl RecordingPersister {
  pub fn records(&self) -> Vec<OutputRecord> {
    self.0.lock().unwrap().clone()
  }
}

#[async_trait]
impl OutputPersister for RecordingPersister {
  async fn persist_output(&self, record: &OutputRecord) -> Result<(), StoreError> {
    self.0.lock().unwrap().push(record.clone());
    Ok(())
  }
}

pub struct FailingPersister;

#[async_trait]
impl OutputPersister for FailingPersister {
  async fn persist_output(&self, _record: &OutputRecord) -> Result<(), StoreError> {
    Err(StoreError::NotFound("outputs table".to_string()))
  }
}
