use serde::{Deserialize, Serialize};

/// A directed data dependency: `target` may reference `source`'s output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub source: String,
  pub target: String,
  /// Input slot on the target (`images`, `character_references`, `prompt`).
  #[serde(
    default,
    alias = "targetHandle",
    alias = "targetInputSlot",
    skip_serializing_if = "Option::is_none"
  )]
  pub target_input_slot: Option<String>,
}

impl EdgeDef {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      target: target.into(),
      target_input_slot: None,
    }
  }

  pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
    self.target_input_slot = Some(slot.into());
    self
  }
}
