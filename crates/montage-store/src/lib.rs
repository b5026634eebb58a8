//! Montage Store
//!
//! Storage for workflow definitions, steps (stored runs of a workflow inside
//! a board) and the final outputs of runs. Data is persisted to SQLite.
//!
//! Two traits split the surface:
//! - [`OutputPersister`] saves a run's final artifact
//! - [`StepStore`] loads and updates workflows and steps

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{
  NodeTiming, OutputRecord, OutputType, Step, StepMetadata, StepStatus, StoredWorkflow,
};

/// JSON column wrapper used by the record types.
pub use sqlx::types::Json;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration failed: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Saves the final artifact of a run.
#[async_trait]
pub trait OutputPersister: Send + Sync {
  async fn persist_output(&self, record: &OutputRecord) -> Result<(), StoreError>;
}

/// Workflows and steps.
#[async_trait]
pub trait StepStore: Send + Sync {
  /// Insert or replace a workflow definition.
  async fn save_workflow(&self, workflow: &StoredWorkflow) -> Result<(), StoreError>;

  async fn get_workflow(&self, workflow_id: &str) -> Result<StoredWorkflow, StoreError>;

  async fn create_step(&self, step: &Step) -> Result<(), StoreError>;

  async fn get_step(&self, step_id: &str) -> Result<Step, StoreError>;

  /// Write every mutable column of the step.
  async fn update_step(&self, step: &Step) -> Result<(), StoreError>;

  /// Steps of a board ordered by `step_order`.
  async fn list_board_steps(&self, board_id: &str) -> Result<Vec<Step>, StoreError>;
}
