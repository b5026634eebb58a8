use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

/// A workflow definition: node set, edge set and metadata.
///
/// The order of `nodes` is the declaration order used to break ties when the
/// graph is sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default)]
  pub workflow_id: String,
  #[serde(default)]
  pub name: String,
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

impl WorkflowDef {
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }
}
