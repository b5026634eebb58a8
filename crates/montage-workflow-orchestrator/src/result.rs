//! Per-node and per-run results.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use montage_store::{NodeTiming, OutputRecord, OutputType};
use montage_task_runtime::{Artifact, ErrorKind, NodeError, NodeOutcome};
use montage_workflow::Node;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Observer state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Idle,
  Running,
  Completed,
  Failed,
  Cancelled,
}

/// Outcome of one attempted node. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub node_id: String,
  pub node_name: String,
  pub node_type: String,
  pub status: NodeStatus,
  pub success: bool,
  /// Node parameters after template resolution.
  pub input: Map<String, Value>,
  pub request_body: Option<Value>,
  pub output: Option<Artifact>,
  pub error: Option<String>,
  pub error_kind: Option<ErrorKind>,
  pub error_details: Option<Value>,
  pub job_id: Option<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
  pub fn from_outcome(
    node: &Node,
    input: Map<String, Value>,
    outcome: NodeOutcome,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
  ) -> Self {
    let mut result = Self {
      node_id: node.node_id.clone(),
      node_name: node.name.clone(),
      node_type: node.type_tag.clone(),
      status: NodeStatus::Completed,
      success: true,
      input,
      request_body: outcome.request_body,
      output: None,
      error: None,
      error_kind: None,
      error_details: None,
      job_id: outcome.job_id,
      started_at,
      finished_at,
    };

    match outcome.result {
      Ok(artifact) => result.output = Some(artifact),
      Err(err) => {
        result.status = match err {
          NodeError::Cancelled => NodeStatus::Cancelled,
          _ => NodeStatus::Failed,
        };
        result.success = false;
        result.error = Some(err.to_string());
        result.error_kind = Some(err.kind());
        result.error_details = err.details().cloned();
      }
    }
    result
  }

  /// A completed result rebuilt from an artifact stored on a step.
  pub fn from_stored(node: &Node, artifact: Artifact, timing: Option<&NodeTiming>) -> Self {
    let now = Utc::now();
    Self {
      node_id: node.node_id.clone(),
      node_name: node.name.clone(),
      node_type: node.type_tag.clone(),
      status: NodeStatus::Completed,
      success: true,
      input: Map::new(),
      request_body: None,
      output: Some(artifact),
      error: None,
      error_kind: None,
      error_details: None,
      job_id: None,
      started_at: timing.map_or(now, |t| t.started_at),
      finished_at: timing.map_or(now, |t| t.finished_at),
    }
  }

  /// The artifact, only when the node succeeded.
  pub fn artifact(&self) -> Option<&Artifact> {
    self.output.as_ref().filter(|_| self.success)
  }

  pub fn timing(&self) -> NodeTiming {
    NodeTiming {
      started_at: self.started_at,
      finished_at: self.finished_at,
    }
  }

  /// The error message with backend details appended, for step records.
  pub fn detailed_error(&self) -> Option<String> {
    let error = self.error.as_ref()?;
    let mut message = error.clone();

    if let Some(details) = &self.error_details {
      let detail_message = details.get("message").and_then(Value::as_str);
      if let Some(detail_message) = detail_message {
        message.push_str(&format!("\n\nDetails: {}", detail_message));
      }

      let mut extra = Vec::new();
      if let Some(reason) = details.get("finishReason").and_then(Value::as_str) {
        extra.push(format!("Finish reason: {}", reason));
      }
      if let Some(inner) = details.get("error").and_then(Value::as_str) {
        if Some(inner) != detail_message && inner != error.as_str() {
          extra.push(format!("Error: {}", inner));
        }
      }
      if !extra.is_empty() {
        message.push('\n');
        message.push_str(&extra.join("\n"));
      }
    }
    Some(message)
  }
}

/// Results keyed by node id, iterated in the order they were recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ExecutionResult>", into = "Vec<ExecutionResult>")]
pub struct ResultSet {
  results: Vec<ExecutionResult>,
  index: HashMap<String, usize>,
}

impl ResultSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a result. A second result for the same node replaces the first
  /// in place.
  pub fn insert(&mut self, result: ExecutionResult) {
    match self.index.get(&result.node_id) {
      Some(&i) => self.results[i] = result,
      None => {
        self.index.insert(result.node_id.clone(), self.results.len());
        self.results.push(result);
      }
    }
  }

  pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
    self.index.get(node_id).map(|&i| &self.results[i])
  }

  pub fn contains(&self, node_id: &str) -> bool {
    self.index.contains_key(node_id)
  }

  /// The most recently recorded result.
  pub fn last(&self) -> Option<&ExecutionResult> {
    self.results.last()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
    self.results.iter()
  }

  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }

  /// First failed node in recording order. Cancellation is not a failure.
  pub fn first_failure(&self) -> Option<&ExecutionResult> {
    self
      .results
      .iter()
      .find(|r| r.status == NodeStatus::Failed)
  }
}

impl From<Vec<ExecutionResult>> for ResultSet {
  fn from(results: Vec<ExecutionResult>) -> Self {
    let mut set = ResultSet::new();
    for result in results {
      set.insert(result);
    }
    set
  }
}

impl From<ResultSet> for Vec<ExecutionResult> {
  fn from(set: ResultSet) -> Self {
    set.results
  }
}

/// Reference to the record written for the terminal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOutput {
  pub output_id: String,
  pub output_type: OutputType,
  pub content_url: Option<String>,
}

impl From<&OutputRecord> for PersistedOutput {
  fn from(record: &OutputRecord) -> Self {
    Self {
      output_id: record.output_id.clone(),
      output_type: record.output_type,
      content_url: record.content_url.clone(),
    }
  }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
  pub execution_id: String,
  pub workflow_id: String,
  /// Sorted node ids, including nodes never reached because of cancellation.
  pub order: Vec<String>,
  pub results: ResultSet,
  /// Last node in sorted order.
  pub terminal_node: Option<String>,
  pub persisted: Option<PersistedOutput>,
  /// Set when the terminal artifact could not be saved. The run itself is
  /// unaffected.
  pub persist_error: Option<String>,
  pub cancelled: bool,
}

impl WorkflowRun {
  /// Not cancelled and the terminal node succeeded. An empty workflow
  /// trivially succeeds.
  pub fn succeeded(&self) -> bool {
    if self.cancelled {
      return false;
    }
    match &self.terminal_node {
      Some(node_id) => self.results.get(node_id).is_some_and(|r| r.success),
      None => true,
    }
  }

  pub fn terminal_result(&self) -> Option<&ExecutionResult> {
    self
      .terminal_node
      .as_deref()
      .and_then(|id| self.results.get(id))
  }
}
