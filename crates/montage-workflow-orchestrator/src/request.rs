//! The execute-graph surface: run an ad-hoc graph and report per-node
//! outputs keyed by label.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use montage_config::{EdgeDef, NodeDef, WorkflowDef, WorkflowInputs};
use montage_task_runtime::Artifact;
use montage_workflow::{NodeType, Workflow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::ExecutionNotifier;
use crate::orchestrator::Orchestrator;
use crate::result::{NodeStatus, WorkflowRun};

static INPUT_PLACEHOLDER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\{\{\s*input\s*\}\}").expect("placeholder pattern is valid"));

const IMAGE_KEYS: [&str; 4] = ["imageData", "image_data", "imageUrl", "image_url"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
  #[serde(default, alias = "workflowId")]
  pub workflow_id: Option<String>,
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
  #[serde(default)]
  pub inputs: Option<WorkflowInputs>,
}

/// One node's entry in an [`ExecuteResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutputView {
  pub node_id: String,
  pub node_type: String,
  pub status: NodeStatus,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<Artifact>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
  /// The run completed and its terminal node succeeded.
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_id: Option<String>,
  /// Keyed by node name, or id when unnamed.
  pub outputs: BTreeMap<String, NodeOutputView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl ExecuteResponse {
  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      success: false,
      execution_id: None,
      outputs: BTreeMap::new(),
      error: Some(error.into()),
    }
  }

  /// Summarize a run. Labels shared by several nodes get the node id
  /// appended, `"Writer (n2)"`.
  pub fn from_run(run: &WorkflowRun) -> Self {
    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for result in run.results.iter() {
      *label_counts.entry(result.node_name.as_str()).or_default() += 1;
    }

    let outputs = run
      .results
      .iter()
      .map(|result| {
        let label = if label_counts[result.node_name.as_str()] > 1 {
          format!("{} ({})", result.node_name, result.node_id)
        } else {
          result.node_name.clone()
        };
        let view = NodeOutputView {
          node_id: result.node_id.clone(),
          node_type: result.node_type.clone(),
          status: result.status,
          success: result.success,
          output: result.output.clone(),
          error: result.error.clone(),
        };
        (label, view)
      })
      .collect();

    let success = run.succeeded();
    let error = if success {
      None
    } else if run.cancelled {
      Some("execution cancelled".to_string())
    } else {
      run
        .terminal_result()
        .and_then(|r| r.error.clone())
        .or_else(|| Some("terminal node did not complete".to_string()))
    };

    Self {
      success,
      execution_id: Some(run.execution_id.clone()),
      outputs,
      error,
    }
  }
}

/// Apply request-level inputs to a definition before it is locked.
///
/// - `text` is written into every `text-input` node
/// - `images[i]` fills the i-th `static-image-input` node, as a URL when it
///   looks like one and as inline data otherwise
/// - `prompt` replaces `{{input}}` in every string config field
pub fn apply_inputs(def: &mut WorkflowDef, inputs: &WorkflowInputs) {
  let mut images = inputs.images.iter();

  for node in &mut def.nodes {
    match NodeType::from_tag(&node.type_tag) {
      Some(NodeType::TextInput) => {
        if let Some(text) = &inputs.text {
          node.config.insert("text".to_string(), Value::from(text.clone()));
        }
      }
      Some(NodeType::StaticImageInput) => {
        if let Some(image) = images.next() {
          for key in IMAGE_KEYS {
            node.config.remove(key);
          }
          let key = if image.starts_with("http://") || image.starts_with("https://") {
            "imageUrl"
          } else {
            "imageData"
          };
          node.config.insert(key.to_string(), Value::from(image.clone()));
        }
      }
      _ => {}
    }

    if let Some(prompt) = &inputs.prompt {
      for value in node.config.values_mut() {
        if let Value::String(s) = value {
          if INPUT_PLACEHOLDER.is_match(s) {
            *s = INPUT_PLACEHOLDER.replace_all(s, regex::NoExpand(prompt)).into_owned();
          }
        }
      }
    }
  }

  if images.next().is_some() {
    warn!("more input images than static image nodes, extra images ignored");
  }
}

/// Lock and run an ad-hoc graph.
///
/// Graph errors come back as an unsuccessful response with no outputs.
pub async fn execute_graph<N: ExecutionNotifier>(
  orchestrator: &Orchestrator<N>,
  request: ExecuteRequest,
  cancel: &CancellationToken,
) -> ExecuteResponse {
  if request.nodes.is_empty() {
    return ExecuteResponse::failed("workflow has no nodes");
  }

  let mut def = WorkflowDef {
    workflow_id: request.workflow_id.unwrap_or_default(),
    name: String::new(),
    nodes: request.nodes,
    edges: request.edges,
  };
  if let Some(inputs) = &request.inputs {
    apply_inputs(&mut def, inputs);
  }

  let workflow = match Workflow::from_def(def) {
    Ok(workflow) => workflow,
    Err(err) => return ExecuteResponse::failed(err.to_string()),
  };

  match orchestrator.run(&workflow, cancel).await {
    Ok(run) => ExecuteResponse::from_run(&run),
    Err(err) => ExecuteResponse::failed(err.to_string()),
  }
}
