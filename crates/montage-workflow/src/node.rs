use std::fmt;

use serde::{Deserialize, Serialize};

/// Known node types. The serialized form is the editor's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
  /// Static text typed by the author (or supplied as a request input).
  TextInput,
  /// Static image uploaded by the author.
  StaticImageInput,
  /// A character sheet picked from master data.
  StaticCharacterReference,
  /// Synchronous text generation (LLM).
  TextGeneration,
  /// Synchronous ("fast") image generation.
  ImageGeneration,
  /// Job-based image generation (submit + poll).
  ImageGenerationJob,
  /// Synchronous text-to-speech.
  SpeechSynthesis,
  /// Job-based image-to-video generation.
  VideoGeneration,
  /// A user-supplied graph executed by an external job runner.
  ExternalJobWorkflow,
}

impl NodeType {
  pub const ALL: [NodeType; 9] = [
    NodeType::TextInput,
    NodeType::StaticImageInput,
    NodeType::StaticCharacterReference,
    NodeType::TextGeneration,
    NodeType::ImageGeneration,
    NodeType::ImageGenerationJob,
    NodeType::SpeechSynthesis,
    NodeType::VideoGeneration,
    NodeType::ExternalJobWorkflow,
  ];

  /// Parse an editor type tag. Returns `None` for unknown tags.
  pub fn from_tag(tag: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.as_tag() == tag)
  }

  pub fn as_tag(&self) -> &'static str {
    match self {
      NodeType::TextInput => "text-input",
      NodeType::StaticImageInput => "static-image-input",
      NodeType::StaticCharacterReference => "static-character-reference",
      NodeType::TextGeneration => "text-generation",
      NodeType::ImageGeneration => "image-generation",
      NodeType::ImageGenerationJob => "image-generation-job",
      NodeType::SpeechSynthesis => "speech-synthesis",
      NodeType::VideoGeneration => "video-generation",
      NodeType::ExternalJobWorkflow => "external-job-workflow",
    }
  }

  /// How many upstream artifacts the node accepts per multi-input slot.
  pub fn slot_limits(&self) -> SlotLimits {
    match self {
      NodeType::TextGeneration => SlotLimits::new(4, 4),
      NodeType::ImageGeneration => SlotLimits::new(3, 3),
      NodeType::ImageGenerationJob => SlotLimits::new(8, 4),
      NodeType::VideoGeneration => SlotLimits::new(1, 0),
      NodeType::ExternalJobWorkflow => SlotLimits::new(8, 0),
      NodeType::TextInput
      | NodeType::StaticImageInput
      | NodeType::StaticCharacterReference
      | NodeType::SpeechSynthesis => SlotLimits::new(0, 0),
    }
  }

  /// Whether the node only republishes author-supplied data.
  pub fn is_input(&self) -> bool {
    matches!(
      self,
      NodeType::TextInput | NodeType::StaticImageInput | NodeType::StaticCharacterReference
    )
  }
}

impl fmt::Display for NodeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_tag())
  }
}

/// Capacity of a node's multi-input slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLimits {
  pub images: usize,
  pub character_references: usize,
}

impl SlotLimits {
  pub const fn new(images: usize, character_references: usize) -> Self {
    Self {
      images,
      character_references,
    }
  }
}

/// Named input slot an edge can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSlot {
  Images,
  CharacterReferences,
  Prompt,
}

impl InputSlot {
  pub fn parse(slot: &str) -> Option<Self> {
    match slot {
      "image" | "images" | "reference_images" => Some(InputSlot::Images),
      "character" | "characters" | "character_references" => Some(InputSlot::CharacterReferences),
      "prompt" | "text" => Some(InputSlot::Prompt),
      _ => None,
    }
  }
}

/// A locked node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  /// Name used by template references. Defaults to the node id.
  pub name: String,
  /// The tag as authored, kept for error messages.
  pub type_tag: String,
  /// `None` when the tag is not a known node type.
  pub node_type: Option<NodeType>,
  pub config: serde_json::Map<String, serde_json::Value>,
}

impl Node {
  pub fn from_def(def: montage_config::NodeDef) -> Self {
    let node_type = NodeType::from_tag(&def.type_tag);
    let name = match def.name {
      Some(name) if !name.trim().is_empty() => name,
      _ => def.node_id.clone(),
    };
    Self {
      node_id: def.node_id,
      name,
      type_tag: def.type_tag,
      node_type,
      config: def.config,
    }
  }
}

/// A locked edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  pub source: String,
  pub target: String,
  pub target_input_slot: Option<String>,
}

impl Edge {
  pub fn slot(&self) -> Option<InputSlot> {
    self.target_input_slot.as_deref().and_then(InputSlot::parse)
  }
}
