use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use montage_config::{NodeDef, PollSettings};
use montage_task_runtime::{
  Artifact, ExecutorRegistry, NodeError, NodeExecutor, NodeInput, QueueItem, QueueStatus,
  Submission,
};
use montage_workflow::{Node, NodeType};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Job executor that replays a scripted list of poll results. Once the
/// script runs out it keeps answering `processing`.
struct ScriptedJob {
  script: Mutex<VecDeque<Result<QueueItem, NodeError>>>,
  polls: AtomicU32,
}

impl ScriptedJob {
  fn new(script: Vec<Result<QueueItem, NodeError>>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      polls: AtomicU32::new(0),
    }
  }

  fn polls(&self) -> u32 {
    self.polls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl NodeExecutor for ScriptedJob {
  fn node_type(&self) -> NodeType {
    NodeType::ImageGenerationJob
  }

  fn is_async(&self) -> bool {
    true
  }

  fn prepare(&self, input: &NodeInput) -> Result<Value, NodeError> {
    let prompt = input.required_str("prompt")?;
    Ok(json!({ "prompt": prompt }))
  }

  async fn submit(&self, _input: &NodeInput, _request: &Value) -> Result<Submission, NodeError> {
    Ok(Submission::Queued(QueueItem::new("q-1", QueueStatus::Pending)))
  }

  async fn poll(&self, job_id: &str) -> Result<QueueItem, NodeError> {
    self.polls.fetch_add(1, Ordering::SeqCst);
    self
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Ok(QueueItem::new(job_id, QueueStatus::Processing)))
  }

  fn complete(&self, item: &QueueItem) -> Result<Artifact, NodeError> {
    let payload = item.output_payload.clone().unwrap_or(Value::Null);
    let url = payload["imageUrl"]
      .as_str()
      .ok_or_else(|| NodeError::backend("missing imageUrl"))?;
    Ok(Artifact::Image(montage_task_runtime::ImageRef {
      image_url: Some(url.to_string()),
      job_id: Some(item.id.clone()),
      ..Default::default()
    }))
  }
}

fn registry(job: std::sync::Arc<ScriptedJob>) -> ExecutorRegistry {
  let mut registry = ExecutorRegistry::with_builtins(PollSettings::default());
  registry.register(job);
  registry
}

fn job_node() -> Node {
  Node::from_def(NodeDef::new("img", "image-generation-job"))
}

fn input() -> NodeInput {
  NodeInput::new("img").with_param("prompt", "a lighthouse")
}

fn completed() -> Result<QueueItem, NodeError> {
  Ok(
    QueueItem::new("q-1", QueueStatus::Completed)
      .with_output(json!({ "imageUrl": "https://cdn/out.png" })),
  )
}

#[tokio::test(start_paused = true)]
async fn test_completed_on_first_poll_polls_once() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![completed()]));
  let registry = registry(job.clone());
  let started = tokio::time::Instant::now();

  let outcome = registry
    .execute(&job_node(), &input(), &CancellationToken::new())
    .await;

  let artifact = outcome.result.unwrap();
  assert_eq!(
    artifact.image().and_then(|i| i.image_url.as_deref()),
    Some("https://cdn/out.png")
  );
  assert_eq!(job.polls(), 1);
  assert_eq!(outcome.job_id.as_deref(), Some("q-1"));
  assert_eq!(outcome.request_body.unwrap()["prompt"], "a lighthouse");
  // First poll does not wait for the interval.
  assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_processing_for_whole_budget_times_out() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![]));
  let registry = registry(job.clone());
  let started = tokio::time::Instant::now();

  let outcome = registry
    .execute(&job_node(), &input(), &CancellationToken::new())
    .await;

  match outcome.result {
    Err(NodeError::Timeout { attempts, .. }) => assert_eq!(attempts, 60),
    other => panic!("expected timeout, got {other:?}"),
  }
  assert_eq!(job.polls(), 60);
  assert_eq!(started.elapsed(), Duration::from_secs(5 * 59));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_backend_error() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![
    Ok(QueueItem::new("q-1", QueueStatus::Queued)),
    Ok(QueueItem::new("q-1", QueueStatus::Failed).with_error("quota exceeded")),
  ]));
  let registry = registry(job.clone());

  let outcome = registry
    .execute(&job_node(), &input(), &CancellationToken::new())
    .await;

  match outcome.result {
    Err(NodeError::Backend { message, .. }) => assert_eq!(message, "quota exceeded"),
    other => panic!("expected backend error, got {other:?}"),
  }
  assert_eq!(job.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_retried() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![
    Err(NodeError::Transport("connection reset".to_string())),
    Err(NodeError::Transport("connection reset".to_string())),
    completed(),
  ]));
  let registry = registry(job.clone());

  let outcome = registry
    .execute(&job_node(), &input(), &CancellationToken::new())
    .await;

  assert!(outcome.result.is_ok());
  assert_eq!(job.polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_polling() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![]));
  let registry = registry(job.clone());
  let cancel = CancellationToken::new();

  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_secs(12)).await;
    trigger.cancel();
  });

  let outcome = registry.execute(&job_node(), &input(), &cancel).await;

  assert!(matches!(outcome.result, Err(NodeError::Cancelled)));
  // Polls at 0s, 5s and 10s.
  assert_eq!(job.polls(), 3);
}

#[tokio::test]
async fn test_missing_prompt_fails_before_submit() {
  let job = std::sync::Arc::new(ScriptedJob::new(vec![completed()]));
  let registry = registry(job.clone());

  let outcome = registry
    .execute(&job_node(), &NodeInput::new("img"), &CancellationToken::new())
    .await;

  assert!(matches!(outcome.result, Err(NodeError::Configuration(_))));
  assert!(outcome.request_body.is_none());
  assert_eq!(job.polls(), 0);
}
