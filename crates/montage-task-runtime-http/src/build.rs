use std::sync::Arc;
use std::time::Duration;

use montage_config::{EndpointSettings, EngineSettings};
use montage_host_http::{Endpoint, HttpClient, HttpError, ReqwestClient};
use montage_task_runtime::{ExecutorRegistry, NodeExecutor};
use tracing::{info, warn};

use crate::external::ExternalWorkflowExecutor;
use crate::image::{ImageGenerationExecutor, ImageJobExecutor};
use crate::speech::SpeechSynthesisExecutor;
use crate::text::TextGenerationExecutor;
use crate::video::VideoGenerationExecutor;

/// Build a registry with the input executors plus one HTTP executor per
/// configured backend, using a `reqwest` client.
pub fn build_registry(settings: &EngineSettings) -> Result<ExecutorRegistry, HttpError> {
  let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(Duration::from_millis(
    settings.http.timeout_ms,
  )));
  build_registry_with_client(settings, client)
}

/// Same as [`build_registry`] with a caller-supplied client.
pub fn build_registry_with_client(
  settings: &EngineSettings,
  client: Arc<dyn HttpClient>,
) -> Result<ExecutorRegistry, HttpError> {
  let backends = &settings.backends;
  let mut registry = ExecutorRegistry::with_builtins(settings.poll);

  register(&mut registry, &backends.text_generation, &client, TextGenerationExecutor::new)?;
  register(&mut registry, &backends.image_generation, &client, ImageGenerationExecutor::new)?;
  register(&mut registry, &backends.image_generation_job, &client, ImageJobExecutor::new)?;
  register(&mut registry, &backends.speech_synthesis, &client, SpeechSynthesisExecutor::new)?;
  register(&mut registry, &backends.video_generation, &client, VideoGenerationExecutor::new)?;
  register(
    &mut registry,
    &backends.external_job_workflow,
    &client,
    ExternalWorkflowExecutor::new,
  )?;

  Ok(registry)
}

fn register<E>(
  registry: &mut ExecutorRegistry,
  settings: &Option<EndpointSettings>,
  client: &Arc<dyn HttpClient>,
  make: fn(Endpoint) -> E,
) -> Result<(), HttpError>
where
  E: NodeExecutor + 'static,
{
  let Some(settings) = settings else {
    return Ok(());
  };

  let mut endpoint = Endpoint::new(&settings.url, client.clone())?;
  if let Some(var) = &settings.api_key_env {
    match std::env::var(var) {
      Ok(key) if !key.is_empty() => endpoint = endpoint.with_api_key(key),
      _ => warn!(env = %var, url = %settings.url, "api key variable is not set"),
    }
  }

  let executor = make(endpoint);
  info!(node_type = %executor.node_type(), url = %settings.url, "backend registered");
  registry.register(Arc::new(executor));
  Ok(())
}
