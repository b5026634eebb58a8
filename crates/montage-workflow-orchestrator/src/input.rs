//! Input resolution: `{{reference}}` templates and input slots.
//!
//! # Templates
//! String fields of a node's config may reference earlier outputs:
//! ```json
//! { "prompt": "Illustrate this: {{prev.response}}", "title": "{{Writer.text}}" }
//! ```
//! - `prev` is the node recorded just before this one in execution order
//! - any other head is a node name, falling back to a node id
//! - no field (`{{prev}}`) means the output's primary text
//! - deeper paths walk into JSON outputs (`{{Comfy.outputs.9.url}}`)
//!
//! Substitution is literal and single pass. Anything that cannot be
//! resolved (unknown node, no result, failed node, missing field) becomes
//! the empty string.
//!
//! # Slots
//! Incoming edges route upstream images and characters into the node's
//! reference lists, or append upstream text to its prompt.

use std::sync::LazyLock;

use montage_task_runtime::{Artifact, CharacterRef, ImageRef, NodeInput};
use montage_workflow::{InputSlot, Node, SlotLimits, Workflow};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use crate::result::{ExecutionResult, ResultSet};

static TEMPLATE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("template pattern is valid"));

const PREV: &str = "prev";

/// What templates can see while one node is resolved.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
  workflow: &'a Workflow,
  results: &'a ResultSet,
  prev: Option<&'a ExecutionResult>,
}

impl<'a> TemplateContext<'a> {
  /// `prev` is the last recorded result.
  pub fn new(workflow: &'a Workflow, results: &'a ResultSet) -> Self {
    Self {
      workflow,
      results,
      prev: results.last(),
    }
  }

  /// Override what `prev` points at.
  pub fn with_prev(mut self, prev: Option<&'a ExecutionResult>) -> Self {
    self.prev = prev;
    self
  }

  /// Resolve every string field of a config map. Other values pass through.
  pub fn resolve_config(&self, config: &Map<String, Value>) -> Map<String, Value> {
    config
      .iter()
      .map(|(key, value)| {
        let value = match value {
          Value::String(s) => Value::String(resolve_template(s, self)),
          other => other.clone(),
        };
        (key.clone(), value)
      })
      .collect()
  }

  fn lookup(&self, expr: &str) -> String {
    let segments: Vec<&str> = expr.split('.').map(str::trim).collect();

    let (result, path) = if segments[0] == PREV {
      (self.prev, &segments[1..])
    } else {
      match self.find_node(&segments) {
        Some((node, rest)) => (self.results.get(&node.node_id), rest),
        None => (None, &segments[..0]),
      }
    };

    let Some(artifact) = result.and_then(ExecutionResult::artifact) else {
      return String::new();
    };

    if path.is_empty() {
      return artifact.primary_text();
    }
    walk(artifact, path).map(stringify).unwrap_or_default()
  }

  /// Longest dotted prefix that names a node (by name, then by id), so
  /// names containing dots still resolve.
  fn find_node<'s>(&self, segments: &'s [&'s str]) -> Option<(&'a Node, &'s [&'s str])> {
    (1..=segments.len()).rev().find_map(|k| {
      let head = segments[..k].join(".");
      self
        .workflow
        .find_by_name(&head)
        .or_else(|| self.workflow.get_node(&head))
        .map(|node| (node, &segments[k..]))
    })
  }
}

/// Substitute every `{{reference}}` in `template`.
///
/// A string without references comes back unchanged, and replaced text is
/// never scanned again.
pub fn resolve_template(template: &str, ctx: &TemplateContext<'_>) -> String {
  if !template.contains("{{") {
    return template.to_string();
  }
  TEMPLATE
    .replace_all(template, |caps: &Captures<'_>| ctx.lookup(&caps[1]))
    .into_owned()
}

fn walk(artifact: &Artifact, path: &[&str]) -> Option<Value> {
  let fields = Value::Object(artifact.fields());
  let mut current = &fields;
  for segment in path {
    current = match current {
      Value::Object(map) => map
        .get(*segment)
        .or_else(|| map.get(&to_snake_case(segment)))?,
      Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current.clone())
}

fn stringify(value: Value) -> String {
  match value {
    Value::String(s) => s,
    Value::Null => String::new(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    other => other.to_string(),
  }
}

/// `imageData` -> `image_data`, so editor-style references reach the
/// snake_case artifact fields.
fn to_snake_case(key: &str) -> String {
  let mut out = String::with_capacity(key.len() + 4);
  for c in key.chars() {
    if c.is_ascii_uppercase() {
      out.push('_');
      out.push(c.to_ascii_lowercase());
    } else {
      out.push(c);
    }
  }
  out
}

/// Build the executor input for `node`: resolved params plus slots filled
/// from incoming edges, in edge declaration order.
pub fn build_input(node: &Node, ctx: &TemplateContext<'_>, execution_id: &str) -> NodeInput {
  let mut params = ctx.resolve_config(&node.config);
  let limits = node
    .node_type
    .map(|t| t.slot_limits())
    .unwrap_or(SlotLimits::new(0, 0));

  let mut images: Vec<ImageRef> = Vec::new();
  let mut characters: Vec<CharacterRef> = Vec::new();
  let mut prompt_parts: Vec<String> = Vec::new();

  for edge in ctx.workflow.incoming_edges(&node.node_id) {
    let Some(source) = ctx.results.get(&edge.source) else {
      continue;
    };
    let Some(artifact) = source.artifact() else {
      continue;
    };

    match edge.slot() {
      Some(InputSlot::Prompt) => prompt_parts.push(artifact.primary_text()),
      Some(InputSlot::Images) => {
        let image = artifact
          .image()
          .or_else(|| artifact.character().and_then(|c| c.image.as_ref()));
        if let Some(image) = image.filter(|i| !i.is_empty()) {
          images.push(image.clone());
        }
      }
      Some(InputSlot::CharacterReferences) => match artifact {
        Artifact::Character(character) => characters.push(character.clone()),
        Artifact::Image(image) if !image.is_empty() => characters.push(CharacterRef {
          name: source.node_name.clone(),
          image: Some(image.clone()),
        }),
        _ => {}
      },
      None => {
        if let Some(image) = artifact.image() {
          images.push(image.clone());
        } else if let Some(character) = artifact.character() {
          characters.push(character.clone());
        }
      }
    }
  }

  if images.len() > limits.images || characters.len() > limits.character_references {
    debug!(
      node_id = %node.node_id,
      images = images.len(),
      characters = characters.len(),
      "slot capacity exceeded, extra inputs dropped"
    );
  }
  images.truncate(limits.images);
  characters.truncate(limits.character_references);

  let prompt_parts: Vec<String> = prompt_parts
    .into_iter()
    .filter(|p| !p.trim().is_empty())
    .collect();
  if !prompt_parts.is_empty() {
    let mut prompt = params
      .get("prompt")
      .and_then(Value::as_str)
      .filter(|p| !p.trim().is_empty())
      .map(|p| format!("{}\n", p))
      .unwrap_or_default();
    prompt.push_str(&prompt_parts.join("\n"));
    params.insert("prompt".to_string(), Value::String(prompt));
  }

  NodeInput {
    execution_id: execution_id.to_string(),
    node_id: node.node_id.clone(),
    node_name: node.name.clone(),
    params,
    reference_images: images,
    character_references: characters,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use montage_config::{EdgeDef, NodeDef, WorkflowDef};
  use montage_task_runtime::{NodeError, NodeOutcome};
  use serde_json::json;

  fn workflow(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> Workflow {
    Workflow::from_def(WorkflowDef {
      workflow_id: "wf".to_string(),
      name: "Test".to_string(),
      nodes,
      edges,
    })
    .unwrap()
  }

  fn record(
    workflow: &Workflow,
    results: &mut ResultSet,
    node_id: &str,
    result: Result<Artifact, NodeError>,
  ) {
    let now = Utc::now();
    let outcome = NodeOutcome {
      request_body: None,
      job_id: None,
      result,
    };
    results.insert(ExecutionResult::from_outcome(
      workflow.get_node(node_id).unwrap(),
      Map::new(),
      outcome,
      now,
      now,
    ));
  }

  fn sample() -> (Workflow, ResultSet) {
    let wf = workflow(
      vec![
        NodeDef::new("a", "text-generation").with_name("Writer"),
        NodeDef::new("b", "image-generation").with_name("Painter"),
        NodeDef::new("c", "external-job-workflow").with_name("Comfy"),
        NodeDef::new("d", "text-generation").with_name("Broken"),
      ],
      vec![],
    );
    let mut results = ResultSet::new();
    record(&wf, &mut results, "a", Ok(Artifact::text("a castle")));
    record(
      &wf,
      &mut results,
      "b",
      Ok(Artifact::Image(ImageRef::from_data("AAAA", "image/png"))),
    );
    record(
      &wf,
      &mut results,
      "c",
      Ok(Artifact::Json(json!({
        "outputs": { "9": [{ "url": "https://cdn/out.png" }] },
        "seed": 42,
        "done": true
      }))),
    );
    record(&wf, &mut results, "d", Err(NodeError::backend("boom")));
    (wf, results)
  }

  #[test]
  fn test_name_and_field_reference() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);

    assert_eq!(
      resolve_template("Draw {{Writer.response}}!", &ctx),
      "Draw a castle!"
    );
    assert_eq!(resolve_template("{{ Writer.text }}", &ctx), "a castle");
    assert_eq!(resolve_template("{{Writer}}", &ctx), "a castle");
  }

  #[test]
  fn test_id_fallback() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(resolve_template("{{a.response}}", &ctx), "a castle");
  }

  #[test]
  fn test_camel_case_field_falls_back_to_snake_case() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(resolve_template("{{Painter.imageData}}", &ctx), "AAAA");
    assert_eq!(resolve_template("{{Painter.image_data}}", &ctx), "AAAA");
  }

  #[test]
  fn test_nested_json_path() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(
      resolve_template("{{Comfy.outputs.9.0.url}}", &ctx),
      "https://cdn/out.png"
    );
    assert_eq!(resolve_template("{{Comfy.seed}}/{{Comfy.done}}", &ctx), "42/true");
    assert_eq!(
      resolve_template("{{Comfy.outputs.9}}", &ctx),
      r#"[{"url":"https://cdn/out.png"}]"#
    );
  }

  #[test]
  fn test_unresolvable_references_become_empty() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);

    // unknown node
    assert_eq!(resolve_template("x{{Ghost.response}}y", &ctx), "xy");
    // failed node
    assert_eq!(resolve_template("x{{Broken.response}}y", &ctx), "xy");
    // missing field
    assert_eq!(resolve_template("x{{Writer.nothing}}y", &ctx), "xy");
    // prev is the failed node
    assert_eq!(resolve_template("x{{prev.response}}y", &ctx), "xy");
  }

  #[test]
  fn test_node_without_result_is_empty() {
    let wf = workflow(vec![NodeDef::new("a", "text-generation")], vec![]);
    let results = ResultSet::new();
    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(resolve_template("[{{a.response}}][{{prev}}]", &ctx), "[][]");
  }

  #[test]
  fn test_resolution_is_idempotent() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);

    let plain = "no references here";
    assert_eq!(resolve_template(plain, &ctx), plain);

    let once = resolve_template("{{Writer.response}} at dusk", &ctx);
    assert_eq!(resolve_template(&once, &ctx), once);
  }

  #[test]
  fn test_substituted_text_is_not_rescanned() {
    let wf = workflow(vec![NodeDef::new("a", "text-generation")], vec![]);
    let mut results = ResultSet::new();
    record(&wf, &mut results, "a", Ok(Artifact::text("{{a.response}}")));
    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(resolve_template("{{a.response}}", &ctx), "{{a.response}}");
  }

  #[test]
  fn test_prev_follows_recording_order() {
    let wf = workflow(
      vec![
        NodeDef::new("x", "text-generation"),
        NodeDef::new("y", "text-generation"),
      ],
      vec![],
    );
    let mut results = ResultSet::new();
    record(&wf, &mut results, "y", Ok(Artifact::text("from y")));
    record(&wf, &mut results, "x", Ok(Artifact::text("from x")));

    let ctx = TemplateContext::new(&wf, &results);
    assert_eq!(resolve_template("{{prev.response}}", &ctx), "from x");

    let ctx = ctx.with_prev(results.get("y"));
    assert_eq!(resolve_template("{{prev.response}}", &ctx), "from y");
  }

  #[test]
  fn test_only_string_fields_are_resolved() {
    let (wf, results) = sample();
    let ctx = TemplateContext::new(&wf, &results);
    let config: Map<String, Value> = json!({
      "prompt": "{{Writer.response}}",
      "duration": 5,
      "tags": ["{{Writer.response}}"],
    })
    .as_object()
    .cloned()
    .unwrap();

    let resolved = ctx.resolve_config(&config);
    assert_eq!(resolved["prompt"], "a castle");
    assert_eq!(resolved["duration"], 5);
    assert_eq!(resolved["tags"], json!(["{{Writer.response}}"]));
  }

  #[test]
  fn test_slots_fill_from_edges() {
    let wf = workflow(
      vec![
        NodeDef::new("img1", "static-image-input"),
        NodeDef::new("img2", "static-image-input"),
        NodeDef::new("hero", "static-character-reference"),
        NodeDef::new("broken", "image-generation"),
        NodeDef::new("story", "text-input"),
        NodeDef::new("gen", "image-generation").with_config("prompt", "A scene"),
      ],
      vec![
        EdgeDef::new("img1", "gen"),
        EdgeDef::new("broken", "gen"),
        EdgeDef::new("hero", "gen"),
        EdgeDef::new("img2", "gen").with_slot("images"),
        EdgeDef::new("story", "gen").with_slot("prompt"),
      ],
    );
    let mut results = ResultSet::new();
    record(&wf, &mut results, "img1", Ok(Artifact::Image(ImageRef::from_url("https://x/1.png"))));
    record(&wf, &mut results, "img2", Ok(Artifact::Image(ImageRef::from_data("BBBB", "image/png"))));
    record(
      &wf,
      &mut results,
      "hero",
      Ok(Artifact::Character(CharacterRef {
        name: "Hero".to_string(),
        image: None,
      })),
    );
    record(&wf, &mut results, "broken", Err(NodeError::backend("down")));
    record(&wf, &mut results, "story", Ok(Artifact::text("at night")));

    let ctx = TemplateContext::new(&wf, &results);
    let input = build_input(wf.get_node("gen").unwrap(), &ctx, "exec-1");

    let sources: Vec<&str> = input
      .reference_images
      .iter()
      .filter_map(ImageRef::source)
      .collect();
    assert_eq!(sources, ["https://x/1.png", "BBBB"]);
    assert_eq!(input.character_references.len(), 1);
    assert_eq!(input.character_references[0].name, "Hero");
    assert_eq!(input.params["prompt"], "A scene\nat night");
    assert_eq!(input.execution_id, "exec-1");
  }

  #[test]
  fn test_slot_limits_truncate() {
    let mut nodes: Vec<NodeDef> = (0..3)
      .map(|i| NodeDef::new(format!("img{i}"), "static-image-input"))
      .collect();
    nodes.push(NodeDef::new("video", "video-generation"));
    let edges = (0..3).map(|i| EdgeDef::new(format!("img{i}"), "video")).collect();
    let wf = workflow(nodes, edges);

    let mut results = ResultSet::new();
    for i in 0..3 {
      record(
        &wf,
        &mut results,
        &format!("img{i}"),
        Ok(Artifact::Image(ImageRef::from_url(format!("https://x/{i}.png")))),
      );
    }

    let ctx = TemplateContext::new(&wf, &results);
    let input = build_input(wf.get_node("video").unwrap(), &ctx, "e");
    assert_eq!(input.reference_images.len(), 1);
    assert_eq!(input.reference_images[0].source(), Some("https://x/0.png"));
  }

  #[test]
  fn test_prompt_slot_without_config_prompt() {
    let wf = workflow(
      vec![
        NodeDef::new("t", "text-input"),
        NodeDef::new("gen", "text-generation"),
      ],
      vec![EdgeDef::new("t", "gen").with_slot("prompt")],
    );
    let mut results = ResultSet::new();
    record(&wf, &mut results, "t", Ok(Artifact::text("Tell a story")));

    let ctx = TemplateContext::new(&wf, &results);
    let input = build_input(wf.get_node("gen").unwrap(), &ctx, "e");
    assert_eq!(input.params["prompt"], "Tell a story");
  }

  #[test]
  fn test_to_snake_case() {
    assert_eq!(to_snake_case("imageData"), "image_data");
    assert_eq!(to_snake_case("videoUrl"), "video_url");
    assert_eq!(to_snake_case("text"), "text");
  }
}
