//! Run-level errors.

use montage_store::StoreError;
use montage_workflow::WorkflowError;

/// Errors that stop a run before (or instead of) executing nodes.
///
/// Node failures are not errors at this level; they are recorded in the
/// node's [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error("invalid workflow: {0}")]
  Graph(#[from] WorkflowError),

  #[error("storage error: {0}")]
  Store(#[from] StoreError),

  #[error("invalid request: {0}")]
  InvalidRequest(String),
}
