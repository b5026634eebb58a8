use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::WorkflowError;

/// Graph structure for traversal and ordering.
///
/// Node ids are kept in declaration order; that order breaks ties between
/// nodes that become ready at the same time, so sorting is reproducible.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node ids in declaration order.
  nodes: Vec<String>,
  /// node_id -> declaration index.
  index: HashMap<String, usize>,
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from node ids (declaration order) and `(from, to)` edges.
  ///
  /// Edges whose endpoints are unknown are ignored here; `Workflow::from_def`
  /// rejects them before a graph is ever built.
  pub fn new(nodes: &[String], edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let index: HashMap<String, usize> = nodes
      .iter()
      .enumerate()
      .map(|(i, id)| (id.clone(), i))
      .collect();

    for node_id in nodes {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for (from, to) in edges {
      if !index.contains_key(from) || !index.contains_key(to) {
        continue;
      }
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    Self {
      nodes: nodes.to_vec(),
      index,
      adjacency,
      reverse_adjacency,
    }
  }

  /// Order nodes so every node comes after all of its upstream nodes.
  ///
  /// Kahn's algorithm. Among nodes that are ready at the same time the one
  /// declared first wins. Fails with [`WorkflowError::CycleDetected`] naming
  /// the nodes of one cycle if the graph is not acyclic.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: Vec<usize> = self
      .nodes
      .iter()
      .map(|id| self.upstream(id).len())
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|(_, degree)| **degree == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
      let node_id = &self.nodes[i];
      order.push(node_id.clone());

      for next in self.downstream(node_id) {
        let j = self.index[next];
        in_degree[j] -= 1;
        if in_degree[j] == 0 {
          ready.push(Reverse(j));
        }
      }
    }

    if order.len() == self.nodes.len() {
      return Ok(order);
    }

    let blocked: HashSet<&str> = self
      .nodes
      .iter()
      .enumerate()
      .filter(|(i, _)| in_degree[*i] > 0)
      .map(|(_, id)| id.as_str())
      .collect();

    Err(WorkflowError::CycleDetected {
      cycle: self.find_cycle(&blocked),
    })
  }

  /// Order for display: the topological order when there is one, else the
  /// declaration order. Never used to execute.
  pub fn display_order(&self) -> Vec<String> {
    self
      .topological_order()
      .unwrap_or_else(|_| self.nodes.clone())
  }

  /// Every node left over by Kahn's algorithm has an upstream node that was
  /// also left over, so walking upstream inside that set must revisit a
  /// node. The revisited stretch is a cycle.
  fn find_cycle(&self, blocked: &HashSet<&str>) -> Vec<String> {
    let Some(start) = self.nodes.iter().find(|id| blocked.contains(id.as_str())) else {
      return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut current = start.as_str();

    loop {
      if let Some(&pos) = seen.get(current) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        // The walk went upstream, edges point the other way.
        cycle.reverse();
        return cycle;
      }
      seen.insert(current, path.len());
      path.push(current);

      match self
        .upstream(current)
        .iter()
        .find(|up| blocked.contains(up.as_str()))
      {
        Some(up) => current = up.as_str(),
        None => return path.iter().map(|s| s.to_string()).collect(),
      }
    }
  }

  /// Node ids in declaration order.
  pub fn nodes(&self) -> &[String] {
    &self.nodes
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}
