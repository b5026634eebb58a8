//! Sequential workflow execution.

use std::sync::Arc;

use chrono::Utc;
use montage_store::OutputPersister;
use montage_task_runtime::ExecutorRegistry;
use montage_workflow::{Node, Workflow, WorkflowError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::input::{TemplateContext, build_input};
use crate::persist::output_record;
use crate::result::{ExecutionResult, NodeStatus, PersistedOutput, ResultSet, WorkflowRun};

/// Runs workflows one node at a time in topological order.
///
/// Generic over `N: ExecutionNotifier` so callers choose how progress is
/// observed. Use [`Orchestrator::new`] for no notifications, or
/// [`Orchestrator::with_notifier`].
pub struct Orchestrator<N: ExecutionNotifier = NoopNotifier> {
  registry: Arc<ExecutorRegistry>,
  persister: Option<Arc<dyn OutputPersister>>,
  notifier: N,
}

impl Orchestrator<NoopNotifier> {
  pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
    Self::with_notifier(registry, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Orchestrator<N> {
  pub fn with_notifier(registry: Arc<ExecutorRegistry>, notifier: N) -> Self {
    Self {
      registry,
      persister: None,
      notifier,
    }
  }

  /// Save the terminal node's artifact after each successful run.
  pub fn with_persister(mut self, persister: Arc<dyn OutputPersister>) -> Self {
    self.persister = Some(persister);
    self
  }

  pub fn registry(&self) -> &ExecutorRegistry {
    &self.registry
  }

  /// Execute every node of `workflow`.
  ///
  /// Fails only when the graph cannot be ordered, in which case no node is
  /// executed. Node failures are recorded in the returned run.
  #[instrument(
    name = "orchestrator_run",
    skip(self, workflow, cancel),
    fields(workflow_id = %workflow.workflow_id)
  )]
  pub async fn run(
    &self,
    workflow: &Workflow,
    cancel: &CancellationToken,
  ) -> Result<WorkflowRun, OrchestratorError> {
    self.execute(workflow, None, cancel).await
  }

  /// Like [`run`](Self::run), tagging the persisted output with `step_id`.
  #[instrument(
    name = "orchestrator_run",
    skip(self, workflow, cancel),
    fields(workflow_id = %workflow.workflow_id)
  )]
  pub async fn run_for_step(
    &self,
    workflow: &Workflow,
    step_id: &str,
    cancel: &CancellationToken,
  ) -> Result<WorkflowRun, OrchestratorError> {
    self.execute(workflow, Some(step_id), cancel).await
  }

  async fn execute(
    &self,
    workflow: &Workflow,
    step_id: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<WorkflowRun, OrchestratorError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    let order = match workflow.graph().topological_order() {
      Ok(order) => order,
      Err(err) => {
        warn!(%execution_id, error = %err, "workflow_failed");
        self.notifier.notify(ExecutionEvent::WorkflowFailed {
          execution_id,
          error: err.to_string(),
        });
        return Err(err.into());
      }
    };

    info!(%execution_id, nodes = order.len(), "workflow_started");
    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow_id: workflow.workflow_id.clone(),
    });

    let mut results = ResultSet::new();
    let mut cancelled = false;

    for node_id in &order {
      if cancel.is_cancelled() {
        cancelled = true;
        break;
      }

      let node = workflow
        .get_node(node_id)
        .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
      let ctx = TemplateContext::new(workflow, &results);
      let result = self.execute_node(node, &ctx, &execution_id, cancel).await;

      let stop = result.status == NodeStatus::Cancelled;
      results.insert(result);
      if stop {
        cancelled = true;
        break;
      }
    }

    let terminal_node = order.last().cloned();
    let mut run = WorkflowRun {
      execution_id: execution_id.clone(),
      workflow_id: workflow.workflow_id.clone(),
      order,
      results,
      terminal_node,
      persisted: None,
      persist_error: None,
      cancelled,
    };

    if cancelled {
      warn!(%execution_id, attempted = run.results.len(), "workflow_cancelled");
      self
        .notifier
        .notify(ExecutionEvent::WorkflowCancelled { execution_id });
      return Ok(run);
    }

    self.persist_terminal(workflow, &mut run, step_id).await;

    let success = run.succeeded();
    info!(%execution_id, success, "workflow_completed");
    self.notifier.notify(ExecutionEvent::WorkflowCompleted {
      execution_id,
      success,
    });
    Ok(run)
  }

  /// Execute a single node against results recorded elsewhere (for
  /// example, a stored step).
  ///
  /// `prev` resolves to the nearest node before this one in sorted order
  /// that has a result in `upstream`.
  pub async fn run_node(
    &self,
    workflow: &Workflow,
    node_id: &str,
    upstream: &ResultSet,
    cancel: &CancellationToken,
  ) -> Result<ExecutionResult, OrchestratorError> {
    let node = workflow
      .get_node(node_id)
      .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
    let order = workflow.graph().topological_order()?;

    let prev = order
      .iter()
      .take_while(|id| id.as_str() != node_id)
      .filter_map(|id| upstream.get(id))
      .last();

    let execution_id = uuid::Uuid::new_v4().to_string();
    let ctx = TemplateContext::new(workflow, upstream).with_prev(prev);
    Ok(self.execute_node(node, &ctx, &execution_id, cancel).await)
  }

  async fn execute_node(
    &self,
    node: &Node,
    ctx: &TemplateContext<'_>,
    execution_id: &str,
    cancel: &CancellationToken,
  ) -> ExecutionResult {
    self.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: execution_id.to_string(),
      node_id: node.node_id.clone(),
    });
    info!(%execution_id, node_id = %node.node_id, node_type = %node.type_tag, "node_started");

    let started_at = Utc::now();
    let input = build_input(node, ctx, execution_id);
    let outcome = self.registry.execute(node, &input, cancel).await;
    let result = ExecutionResult::from_outcome(node, input.params, outcome, started_at, Utc::now());

    match result.status {
      NodeStatus::Completed => {
        info!(%execution_id, node_id = %node.node_id, "node_completed");
        let data = result
          .output
          .as_ref()
          .map(|a| Value::Object(a.fields()))
          .unwrap_or(Value::Null);
        self.notifier.notify(ExecutionEvent::NodeCompleted {
          execution_id: execution_id.to_string(),
          node_id: node.node_id.clone(),
          data,
        });
      }
      NodeStatus::Cancelled => {
        warn!(%execution_id, node_id = %node.node_id, "node_cancelled");
        self.notifier.notify(ExecutionEvent::NodeCancelled {
          execution_id: execution_id.to_string(),
          node_id: node.node_id.clone(),
        });
      }
      _ => {
        let error = result.error.clone().unwrap_or_default();
        warn!(
          %execution_id,
          node_id = %node.node_id,
          error_kind = ?result.error_kind,
          %error,
          "node_failed"
        );
        self.notifier.notify(ExecutionEvent::NodeFailed {
          execution_id: execution_id.to_string(),
          node_id: node.node_id.clone(),
          error,
        });
      }
    }
    result
  }

  /// Hand the terminal artifact to the persister. Persistence failures are
  /// logged and reported on the run, never turned into node failures.
  async fn persist_terminal(&self, workflow: &Workflow, run: &mut WorkflowRun, step_id: Option<&str>) {
    let Some(persister) = &self.persister else {
      return;
    };
    let Some(result) = run.terminal_result() else {
      return;
    };
    if !result.success {
      info!(node_id = %result.node_id, "terminal node failed, nothing persisted");
      return;
    }
    let Some(node) = workflow.get_node(&result.node_id) else {
      return;
    };
    let Some(record) = output_record(workflow, node, result, &run.execution_id, step_id) else {
      debug!(node_id = %result.node_id, "terminal output is not persistable");
      return;
    };

    match persister.persist_output(&record).await {
      Ok(()) => {
        info!(output_id = %record.output_id, output_type = ?record.output_type, "output_persisted");
        run.persisted = Some(PersistedOutput::from(&record));
      }
      Err(err) => {
        error!(node_id = %record.node_id, error = %err, "output_persist_failed");
        run.persist_error = Some(err.to_string());
      }
    }
  }
}
