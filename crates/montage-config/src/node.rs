use serde::{Deserialize, Serialize};

/// A node as authored in the editor.
///
/// The type tag stays a plain string here. Mapping it onto a known node type
/// happens when the workflow is locked, so a single unknown tag fails only
/// that node instead of the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  #[serde(alias = "id")]
  pub node_id: String,
  #[serde(rename = "type")]
  pub type_tag: String,
  /// Human-readable name used by `{{name.field}}` template references.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  /// Free-form parameters (prompt, aspect ratio, voice id, ...).
  #[serde(default)]
  pub config: serde_json::Map<String, serde_json::Value>,
}

impl NodeDef {
  pub fn new(node_id: impl Into<String>, type_tag: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      type_tag: type_tag.into(),
      name: None,
      config: serde_json::Map::new(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.config.insert(key.into(), value.into());
    self
  }

  /// Label used when reporting results: the name if set, else the id.
  pub fn label(&self) -> &str {
    self.name.as_deref().unwrap_or(&self.node_id)
  }
}
