use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use montage_config::{WorkflowDef, WorkflowInputs};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

/// Kind of a persisted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OutputType {
  Image,
  Audio,
  Video,
  Text,
  Json,
}

/// A workflow definition as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StoredWorkflow {
  pub workflow_id: String,
  pub name: String,
  pub definition: Json<WorkflowDef>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl StoredWorkflow {
  pub fn new(definition: WorkflowDef) -> Self {
    let now = Utc::now();
    Self {
      workflow_id: definition.workflow_id.clone(),
      name: definition.name.clone(),
      definition: Json(definition),
      created_at: now,
      updated_at: now,
    }
  }
}

/// Start and end of one node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTiming {
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

/// Bookkeeping written back to a step after each run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
  /// node_id -> request body sent to the backend.
  #[serde(default)]
  pub execution_requests: Map<String, Value>,
  #[serde(default)]
  pub node_timings: BTreeMap<String, NodeTiming>,
  /// Anything else callers keep on the step.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One run of a stored workflow inside a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Step {
  pub step_id: String,
  pub workflow_id: String,
  pub board_id: Option<String>,
  pub step_order: i64,
  pub status: StepStatus,
  pub inputs: Json<WorkflowInputs>,
  /// node_id -> serialized artifact.
  pub output_data: Json<Map<String, Value>>,
  pub metadata: Json<StepMetadata>,
  pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Step {
  pub fn new(step_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      step_id: step_id.into(),
      workflow_id: workflow_id.into(),
      board_id: None,
      step_order: 0,
      status: StepStatus::Pending,
      inputs: Json(WorkflowInputs::default()),
      output_data: Json(Map::new()),
      metadata: Json(StepMetadata::default()),
      error_message: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn in_board(mut self, board_id: impl Into<String>, step_order: i64) -> Self {
    self.board_id = Some(board_id.into());
    self.step_order = step_order;
    self
  }

  pub fn with_inputs(mut self, inputs: WorkflowInputs) -> Self {
    self.inputs = Json(inputs);
    self
  }
}

/// A final artifact saved for the outputs gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutputRecord {
  pub output_id: String,
  pub execution_id: String,
  pub workflow_id: Option<String>,
  pub step_id: Option<String>,
  pub node_id: String,
  pub node_name: String,
  pub node_type: String,
  pub output_type: OutputType,
  pub content_url: Option<String>,
  pub content_text: Option<String>,
  pub prompt: Option<String>,
  /// Generation parameters (aspect ratio, job id, duration, ...).
  pub metadata: Json<Value>,
  pub created_at: DateTime<Utc>,
}
