use thiserror::Error;

/// Graph-level errors. Any of these rejects the run before a node executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("cycle detected in workflow: {}", cycle.join(" -> "))]
  CycleDetected {
    /// Nodes on one cycle, in edge order.
    cycle: Vec<String>,
  },
}
