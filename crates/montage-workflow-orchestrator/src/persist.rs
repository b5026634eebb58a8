//! Mapping a terminal result onto an output record.

use chrono::Utc;
use montage_store::{Json, OutputRecord, OutputType};
use montage_task_runtime::Artifact;
use montage_workflow::{Node, Workflow};
use serde_json::{Map, Value};

use crate::result::ExecutionResult;

/// Build the record saved for a run's terminal node.
///
/// Returns `None` when there is nothing worth keeping: input nodes, failed
/// nodes, character references, and images with no content at all.
///
/// Images point at their stored path or URL. An image that only came back
/// inline keeps its base64 data in `content_text` and its mime type in the
/// metadata.
pub fn output_record(
  workflow: &Workflow,
  node: &Node,
  result: &ExecutionResult,
  execution_id: &str,
  step_id: Option<&str>,
) -> Option<OutputRecord> {
  if node.node_type.is_none_or(|t| t.is_input()) {
    return None;
  }
  let artifact = result.artifact()?;

  let mut metadata = Map::new();
  metadata.insert("nodeId".to_string(), Value::from(node.node_id.clone()));
  metadata.insert("nodeType".to_string(), Value::from(node.type_tag.clone()));
  metadata.insert("nodeName".to_string(), Value::from(node.name.clone()));
  if let Some(aspect_ratio) = param(result, &["aspectRatio", "aspect_ratio"]) {
    metadata.insert("aspectRatio".to_string(), aspect_ratio.clone());
  }
  if let Some(step_id) = step_id {
    metadata.insert("stepId".to_string(), Value::from(step_id));
  }

  let (output_type, content_url, content_text) = match artifact {
    Artifact::Image(image) => {
      if let Some(job_id) = &image.job_id {
        metadata.insert("jobId".to_string(), Value::from(job_id.clone()));
      }
      match image.storage_path.clone().or_else(|| image.image_url.clone()) {
        Some(url) => (OutputType::Image, Some(url), None),
        None => {
          let data = image.image_data.clone().filter(|d| !d.is_empty())?;
          if let Some(mime_type) = &image.mime_type {
            metadata.insert("mimeType".to_string(), Value::from(mime_type.clone()));
          }
          (OutputType::Image, None, Some(data))
        }
      }
    }
    Artifact::Video {
      url,
      job_id,
      duration,
    } => {
      if let Some(job_id) = job_id {
        metadata.insert("jobId".to_string(), Value::from(job_id.clone()));
      }
      if let Some(duration) = duration {
        metadata.insert("duration".to_string(), Value::from(*duration));
      }
      (OutputType::Video, Some(url.clone()), None)
    }
    Artifact::Audio { data, mime_type } => {
      metadata.insert("mimeType".to_string(), Value::from(mime_type.clone()));
      (OutputType::Audio, None, Some(data.clone()))
    }
    Artifact::Text { text } => (OutputType::Text, None, Some(text.clone())),
    Artifact::Json(value) => {
      if let Some(job_id) = &result.job_id {
        metadata.insert("jobId".to_string(), Value::from(job_id.clone()));
      }
      (OutputType::Json, None, Some(value.to_string()))
    }
    Artifact::Character(_) => return None,
  };

  let prompt = result
    .request_body
    .as_ref()
    .and_then(|body| body.get("prompt"))
    .and_then(Value::as_str)
    .or_else(|| param(result, &["prompt"]).and_then(Value::as_str))
    .filter(|p| !p.is_empty())
    .map(str::to_string);

  Some(OutputRecord {
    output_id: uuid::Uuid::new_v4().to_string(),
    execution_id: execution_id.to_string(),
    workflow_id: Some(workflow.workflow_id.clone()).filter(|id| !id.is_empty()),
    step_id: step_id.map(str::to_string),
    node_id: node.node_id.clone(),
    node_name: node.name.clone(),
    node_type: node.type_tag.clone(),
    output_type,
    content_url,
    content_text,
    prompt,
    metadata: Json(Value::Object(metadata)),
    created_at: Utc::now(),
  })
}

fn param<'r>(result: &'r ExecutionResult, keys: &[&str]) -> Option<&'r Value> {
  keys.iter().find_map(|k| result.input.get(*k))
}

#[cfg(test)]
mod tests {
  use super::*;
  use montage_config::{NodeDef, WorkflowDef};
  use montage_task_runtime::{ImageRef, NodeError, NodeOutcome};
  use serde_json::json;

  fn workflow(node: NodeDef) -> Workflow {
    Workflow::from_def(WorkflowDef {
      workflow_id: "wf-1".to_string(),
      name: "Test".to_string(),
      nodes: vec![node],
      edges: vec![],
    })
    .unwrap()
  }

  fn result(
    workflow: &Workflow,
    input: Value,
    request_body: Option<Value>,
    res: Result<Artifact, NodeError>,
  ) -> ExecutionResult {
    let now = Utc::now();
    ExecutionResult::from_outcome(
      &workflow.nodes()[0],
      input.as_object().cloned().unwrap_or_default(),
      NodeOutcome {
        request_body,
        job_id: Some("job-7".to_string()),
        result: res,
      },
      now,
      now,
    )
  }

  #[test]
  fn test_image_record_prefers_storage_path() {
    let wf = workflow(NodeDef::new("img", "image-generation-job").with_name("Poster"));
    let image = ImageRef {
      image_url: Some("https://cdn/p.png".to_string()),
      storage_path: Some("outputs/p.png".to_string()),
      job_id: Some("job-7".to_string()),
      ..Default::default()
    };
    let r = result(
      &wf,
      json!({ "prompt": "config prompt", "aspectRatio": "4:3" }),
      Some(json!({ "prompt": "sent prompt" })),
      Ok(Artifact::Image(image)),
    );

    let record = output_record(&wf, &wf.nodes()[0], &r, "exec-1", Some("step-1")).unwrap();
    assert_eq!(record.output_type, OutputType::Image);
    assert_eq!(record.content_url.as_deref(), Some("outputs/p.png"));
    assert_eq!(record.prompt.as_deref(), Some("sent prompt"));
    assert_eq!(record.workflow_id.as_deref(), Some("wf-1"));
    assert_eq!(record.step_id.as_deref(), Some("step-1"));
    assert_eq!(record.node_name, "Poster");
    assert_eq!(record.metadata.0["aspectRatio"], "4:3");
    assert_eq!(record.metadata.0["jobId"], "job-7");
    assert_eq!(record.metadata.0["stepId"], "step-1");
  }

  #[test]
  fn test_inline_image_keeps_data() {
    let wf = workflow(NodeDef::new("img", "image-generation"));
    let r = result(
      &wf,
      json!({ "prompt": "a fox" }),
      None,
      Ok(Artifact::Image(ImageRef::from_data("AAAA", "image/png"))),
    );

    let record = output_record(&wf, &wf.nodes()[0], &r, "e", None).unwrap();
    assert_eq!(record.output_type, OutputType::Image);
    assert!(record.content_url.is_none());
    assert_eq!(record.content_text.as_deref(), Some("AAAA"));
    assert_eq!(record.metadata.0["mimeType"], "image/png");
    assert_eq!(record.prompt.as_deref(), Some("a fox"));
  }

  #[test]
  fn test_empty_image_is_not_persistable() {
    let wf = workflow(NodeDef::new("img", "image-generation"));
    let r = result(&wf, json!({}), None, Ok(Artifact::Image(ImageRef::default())));
    assert!(output_record(&wf, &wf.nodes()[0], &r, "e", None).is_none());
  }

  #[test]
  fn test_video_and_text_records() {
    let wf = workflow(NodeDef::new("v", "video-generation"));
    let r = result(
      &wf,
      json!({ "prompt": "pan left" }),
      None,
      Ok(Artifact::Video {
        url: "https://cdn/v.mp4".to_string(),
        job_id: Some("job-7".to_string()),
        duration: Some(5.0),
      }),
    );
    let record = output_record(&wf, &wf.nodes()[0], &r, "e", None).unwrap();
    assert_eq!(record.output_type, OutputType::Video);
    assert_eq!(record.prompt.as_deref(), Some("pan left"));
    assert_eq!(record.metadata.0["duration"], 5.0);
    assert!(record.step_id.is_none());

    let wf = workflow(NodeDef::new("t", "text-generation"));
    let r = result(&wf, json!({}), None, Ok(Artifact::text("story")));
    let record = output_record(&wf, &wf.nodes()[0], &r, "e", None).unwrap();
    assert_eq!(record.output_type, OutputType::Text);
    assert_eq!(record.content_text.as_deref(), Some("story"));
    assert!(record.prompt.is_none());
  }

  #[test]
  fn test_input_and_failed_nodes_are_skipped() {
    let wf = workflow(NodeDef::new("t", "text-input"));
    let r = result(&wf, json!({}), None, Ok(Artifact::text("typed")));
    assert!(output_record(&wf, &wf.nodes()[0], &r, "e", None).is_none());

    let wf = workflow(NodeDef::new("t", "text-generation"));
    let r = result(&wf, json!({}), None, Err(NodeError::backend("down")));
    assert!(output_record(&wf, &wf.nodes()[0], &r, "e", None).is_none());
  }
}
