//! Executor registry.

use std::collections::HashMap;
use std::sync::Arc;

use montage_config::PollSettings;
use montage_workflow::{Node, NodeType};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::artifact::Artifact;
use crate::builtin::{StaticCharacterExecutor, StaticImageExecutor, TextInputExecutor};
use crate::error::NodeError;
use crate::executor::{NodeExecutor, NodeInput, Submission};
use crate::poller::poll_until_terminal;

/// Result of dispatching one node.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
  /// The body sent to the backend, when preparation got that far.
  pub request_body: Option<Value>,
  /// Backend job id for queued submissions.
  pub job_id: Option<String>,
  pub result: Result<Artifact, NodeError>,
}

impl NodeOutcome {
  fn failed(request_body: Option<Value>, job_id: Option<String>, err: NodeError) -> Self {
    Self {
      request_body,
      job_id,
      result: Err(err),
    }
  }
}

/// Maps node types to executors. Built once at startup and shared.
#[derive(Clone)]
pub struct ExecutorRegistry {
  executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
  poll: PollSettings,
}

impl ExecutorRegistry {
  /// An empty registry.
  pub fn new(poll: PollSettings) -> Self {
    Self {
      executors: HashMap::new(),
      poll,
    }
  }

  /// A registry with the input node executors registered.
  pub fn with_builtins(poll: PollSettings) -> Self {
    let mut registry = Self::new(poll);
    registry.register(Arc::new(TextInputExecutor));
    registry.register(Arc::new(StaticImageExecutor));
    registry.register(Arc::new(StaticCharacterExecutor));
    registry
  }

  /// Register an executor, replacing any previous one for the same type.
  pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
    self.executors.insert(executor.node_type(), executor);
  }

  pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn NodeExecutor>> {
    self.executors.get(&node_type)
  }

  pub fn contains(&self, node_type: NodeType) -> bool {
    self.executors.contains_key(&node_type)
  }

  /// Run one node to completion: prepare, submit and, for job backends,
  /// poll until the job is terminal.
  ///
  /// A queued submission from an executor that is not [`is_async`] is a
  /// configuration error and is never polled.
  ///
  /// [`is_async`]: NodeExecutor::is_async
  #[instrument(
    name = "node_execute",
    skip(self, node, input, cancel),
    fields(
      execution_id = %input.execution_id,
      node_id = %node.node_id,
      node_type = %node.type_tag,
    )
  )]
  pub async fn execute(
    &self,
    node: &Node,
    input: &NodeInput,
    cancel: &CancellationToken,
  ) -> NodeOutcome {
    let Some(executor) = node.node_type.and_then(|t| self.get(t)) else {
      return NodeOutcome::failed(None, None, NodeError::UnknownType(node.type_tag.clone()));
    };

    if cancel.is_cancelled() {
      return NodeOutcome::failed(None, None, NodeError::Cancelled);
    }

    let request = match executor.prepare(input) {
      Ok(request) => request,
      Err(err) => return NodeOutcome::failed(None, None, err),
    };

    let submission = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(NodeError::Cancelled),
      result = executor.submit(input, &request) => result,
    };

    match submission {
      Ok(Submission::Completed(artifact)) => NodeOutcome {
        request_body: Some(request),
        job_id: None,
        result: Ok(artifact),
      },
      Ok(Submission::Queued(item)) if !executor.is_async() => NodeOutcome::failed(
        Some(request),
        Some(item.id.clone()),
        NodeError::configuration(format!(
          "{} returned job '{}' but does not support polling",
          node.type_tag, item.id
        )),
      ),
      Ok(Submission::Queued(item)) => {
        info!(job_id = %item.id, "job_submitted");
        let job_id = Some(item.id.clone());
        let result = poll_until_terminal(executor.as_ref(), &item.id, self.poll, cancel)
          .await
          .and_then(|done| executor.complete(&done));
        NodeOutcome {
          request_body: Some(request),
          job_id,
          result,
        }
      }
      Err(err) => NodeOutcome::failed(Some(request), None, err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use montage_config::NodeDef;

  fn node(type_tag: &str) -> Node {
    Node::from_def(NodeDef::new("n1", type_tag))
  }

  #[tokio::test]
  async fn test_builtin_text_input() {
    let registry = ExecutorRegistry::with_builtins(PollSettings::default());
    let input = NodeInput::new("n1").with_param("text", "hello");

    let outcome = registry
      .execute(&node("text-input"), &input, &CancellationToken::new())
      .await;

    assert_eq!(outcome.result.unwrap(), Artifact::text("hello"));
    assert_eq!(outcome.request_body.unwrap()["text"], "hello");
  }

  #[tokio::test]
  async fn test_unknown_tag() {
    let registry = ExecutorRegistry::with_builtins(PollSettings::default());
    let outcome = registry
      .execute(&node("hologram"), &NodeInput::new("n1"), &CancellationToken::new())
      .await;

    match outcome.result {
      Err(NodeError::UnknownType(tag)) => assert_eq!(tag, "hologram"),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_unregistered_type_is_unknown() {
    let registry = ExecutorRegistry::with_builtins(PollSettings::default());
    assert!(!registry.contains(NodeType::TextGeneration));

    let outcome = registry
      .execute(
        &node("text-generation"),
        &NodeInput::new("n1"),
        &CancellationToken::new(),
      )
      .await;
    assert!(matches!(outcome.result, Err(NodeError::UnknownType(_))));
  }

  /// Synchronous executor that wrongly answers with a job.
  struct QueuingText;

  #[async_trait::async_trait]
  impl NodeExecutor for QueuingText {
    fn node_type(&self) -> NodeType {
      NodeType::TextGeneration
    }

    fn prepare(&self, _input: &NodeInput) -> Result<Value, NodeError> {
      Ok(Value::Null)
    }

    async fn submit(&self, _input: &NodeInput, _request: &Value) -> Result<Submission, NodeError> {
      Ok(Submission::Queued(crate::queue::QueueItem::new(
        "q-9",
        crate::queue::QueueStatus::Pending,
      )))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_queued_submission_from_sync_executor_is_rejected() {
    let mut registry = ExecutorRegistry::with_builtins(PollSettings::default());
    registry.register(Arc::new(QueuingText));

    let started = tokio::time::Instant::now();
    let outcome = registry
      .execute(
        &node("text-generation"),
        &NodeInput::new("n1"),
        &CancellationToken::new(),
      )
      .await;

    match outcome.result {
      Err(NodeError::Configuration(message)) => {
        assert!(message.contains("does not support polling"), "{message}");
      }
      other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(outcome.job_id.as_deref(), Some("q-9"));
    assert_eq!(started.elapsed(), std::time::Duration::ZERO);
  }

  #[tokio::test]
  async fn test_cancelled_before_start() {
    let registry = ExecutorRegistry::with_builtins(PollSettings::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = registry
      .execute(&node("text-input"), &NodeInput::new("n1"), &cancel)
      .await;
    assert!(matches!(outcome.result, Err(NodeError::Cancelled)));
    assert!(outcome.request_body.is_none());
  }
}
