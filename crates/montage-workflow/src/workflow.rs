use std::collections::HashMap;

use montage_config::WorkflowDef;

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::{Edge, Node};

/// A locked workflow ready for execution.
///
/// Built once per run from a [`WorkflowDef`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  nodes: Vec<Node>,
  index: HashMap<String, usize>,
  edges: Vec<Edge>,
  graph: Graph,
}

impl Workflow {
  /// Validate a definition and lock it.
  ///
  /// Rejects duplicate node ids and edges whose endpoints are not in the
  /// node set. Cycles are reported later by [`Graph::topological_order`].
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut index = HashMap::with_capacity(def.nodes.len());
    let mut nodes = Vec::with_capacity(def.nodes.len());

    for node_def in def.nodes {
      if index.contains_key(&node_def.node_id) {
        return Err(WorkflowError::DuplicateNode(node_def.node_id));
      }
      index.insert(node_def.node_id.clone(), nodes.len());
      nodes.push(Node::from_def(node_def));
    }

    let mut edges = Vec::with_capacity(def.edges.len());
    for edge in def.edges {
      if !index.contains_key(&edge.source) || !index.contains_key(&edge.target) {
        return Err(WorkflowError::InvalidEdge {
          from: edge.source,
          to: edge.target,
        });
      }
      edges.push(Edge {
        source: edge.source,
        target: edge.target,
        target_input_slot: edge.target_input_slot,
      });
    }

    let node_ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    let pairs: Vec<(String, String)> = edges
      .iter()
      .map(|e| (e.source.clone(), e.target.clone()))
      .collect();
    let graph = Graph::new(&node_ids, &pairs);

    Ok(Self {
      workflow_id: def.workflow_id,
      name: def.name,
      nodes,
      index,
      edges,
      graph,
    })
  }

  /// The graph structure for traversal.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|&i| &self.nodes[i])
  }

  /// Look a node up by its template name.
  pub fn find_by_name(&self, name: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.name == name)
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Edges pointing at `node_id`, in declaration order.
  pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
    self.edges.iter().filter(move |e| e.target == node_id)
  }
}
