//! Step surfaces: running a stored workflow for a step, or re-running one
//! of its nodes, and writing the results back to the step row.

use std::sync::Arc;

use chrono::Utc;
use montage_config::WorkflowInputs;
use montage_store::{Step, StepStatus, StepStore, StoreError};
use montage_task_runtime::Artifact;
use montage_workflow::{Workflow, WorkflowError};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::orchestrator::Orchestrator;
use crate::request::apply_inputs;
use crate::result::{ExecutionResult, ResultSet, WorkflowRun};

/// Runs steps against a [`StepStore`].
pub struct StepRunner<N: ExecutionNotifier = NoopNotifier> {
  orchestrator: Orchestrator<N>,
  store: Arc<dyn StepStore>,
}

impl<N: ExecutionNotifier> StepRunner<N> {
  pub fn new(orchestrator: Orchestrator<N>, store: Arc<dyn StepStore>) -> Self {
    Self {
      orchestrator,
      store,
    }
  }

  /// Run the step's workflow end to end.
  ///
  /// The step is marked `running` first, then `completed` with every node
  /// output and request body, or `failed` with the first failing node's
  /// error. Graph errors also mark the step failed before being returned.
  #[instrument(name = "step_run", skip(self, cancel))]
  pub async fn run_step(
    &self,
    step_id: &str,
    cancel: &CancellationToken,
  ) -> Result<WorkflowRun, OrchestratorError> {
    let mut step = self.store.get_step(step_id).await?;
    step.status = StepStatus::Running;
    step.error_message = None;
    step.updated_at = Utc::now();
    self.store.update_step(&step).await?;

    let run = match self.load_workflow(&step).await {
      Ok(workflow) => {
        self
          .orchestrator
          .run_for_step(&workflow, step_id, cancel)
          .await
      }
      Err(err) => Err(err),
    };

    let run = match run {
      Ok(run) => run,
      Err(err) => {
        step.status = StepStatus::Failed;
        step.error_message = Some(err.to_string());
        step.updated_at = Utc::now();
        self.store.update_step(&step).await?;
        return Err(err);
      }
    };

    let mut output_data = Map::new();
    let mut metadata = step.metadata.0.clone();
    metadata.execution_requests.clear();
    metadata.node_timings.clear();
    for result in run.results.iter() {
      if let Some(artifact) = result.artifact() {
        output_data.insert(result.node_id.clone(), artifact_value(artifact)?);
      }
      if let Some(body) = &result.request_body {
        metadata
          .execution_requests
          .insert(result.node_id.clone(), body.clone());
      }
      metadata
        .node_timings
        .insert(result.node_id.clone(), result.timing());
    }

    step.output_data.0 = output_data;
    step.metadata.0 = metadata;
    if run.succeeded() {
      step.status = StepStatus::Completed;
      step.error_message = None;
    } else {
      step.status = StepStatus::Failed;
      step.error_message = Some(failure_message(&run));
    }
    step.updated_at = Utc::now();
    self.store.update_step(&step).await?;

    info!(status = ?step.status, "step_updated");
    Ok(run)
  }

  /// Execute a single node of the step's workflow.
  ///
  /// Upstream results are rebuilt from the outputs already stored on the
  /// step. On success the node's output, request body and timing are merged
  /// into the step. A failed node leaves the step untouched.
  #[instrument(name = "step_run_node", skip(self, cancel))]
  pub async fn run_step_node(
    &self,
    step_id: &str,
    node_id: &str,
    cancel: &CancellationToken,
  ) -> Result<ExecutionResult, OrchestratorError> {
    let mut step = self.store.get_step(step_id).await?;
    let workflow = self.load_workflow(&step).await?;
    if workflow.get_node(node_id).is_none() {
      return Err(WorkflowError::NodeNotFound(node_id.to_string()).into());
    }

    let upstream = stored_results(&workflow, &step)?;
    let result = self
      .orchestrator
      .run_node(&workflow, node_id, &upstream, cancel)
      .await?;

    let Some(artifact) = result.artifact() else {
      warn!(error = ?result.error, "node failed, step not updated");
      return Ok(result);
    };

    step
      .output_data
      .0
      .insert(node_id.to_string(), artifact_value(artifact)?);
    let metadata = &mut step.metadata.0;
    if let Some(body) = &result.request_body {
      metadata
        .execution_requests
        .insert(node_id.to_string(), body.clone());
    }
    metadata
      .node_timings
      .insert(node_id.to_string(), result.timing());
    step.updated_at = Utc::now();
    self.store.update_step(&step).await?;

    info!("step_node_saved");
    Ok(result)
  }

  /// Lock the step's workflow with the step inputs applied.
  ///
  /// Steps on a board also receive the images produced by earlier completed
  /// steps of that board, appended after their own input images.
  async fn load_workflow(&self, step: &Step) -> Result<Workflow, OrchestratorError> {
    let stored = self.store.get_workflow(&step.workflow_id).await?;
    let mut def = stored.definition.0;
    if def.workflow_id.is_empty() {
      def.workflow_id = stored.workflow_id;
    }

    let mut inputs: WorkflowInputs = step.inputs.0.clone();
    if let Some(board_id) = &step.board_id {
      let earlier = self.store.list_board_steps(board_id).await?;
      let images = earlier
        .iter()
        .filter(|s| s.step_order < step.step_order && s.status == StepStatus::Completed)
        .flat_map(|s| s.output_data.0.values())
        .filter_map(|v| serde_json::from_value::<Artifact>(v.clone()).ok())
        .filter_map(|a| a.image().and_then(|i| i.source()).map(str::to_string));
      inputs.images.extend(images);
    }

    apply_inputs(&mut def, &inputs);
    Ok(Workflow::from_def(def)?)
  }
}

/// Completed results rebuilt from a step's stored outputs, in sorted order.
fn stored_results(workflow: &Workflow, step: &Step) -> Result<ResultSet, OrchestratorError> {
  let order = workflow.graph().topological_order()?;
  let mut results = ResultSet::new();
  for node_id in order {
    let (Some(node), Some(value)) = (workflow.get_node(&node_id), step.output_data.0.get(&node_id))
    else {
      continue;
    };
    match serde_json::from_value::<Artifact>(value.clone()) {
      Ok(artifact) => {
        let timing = step.metadata.0.node_timings.get(&node_id);
        results.insert(ExecutionResult::from_stored(node, artifact, timing));
      }
      Err(err) => debug!(%node_id, error = %err, "stored output skipped"),
    }
  }
  Ok(results)
}

fn artifact_value(artifact: &Artifact) -> Result<Value, OrchestratorError> {
  serde_json::to_value(artifact).map_err(|e| StoreError::from(e).into())
}

fn failure_message(run: &WorkflowRun) -> String {
  if run.cancelled {
    return "execution cancelled".to_string();
  }
  run
    .results
    .first_failure()
    .or_else(|| run.terminal_result())
    .and_then(ExecutionResult::detailed_error)
    .unwrap_or_else(|| "unknown error".to_string())
}
