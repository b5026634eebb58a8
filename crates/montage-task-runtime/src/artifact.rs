//! Typed node outputs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An image produced or supplied by a node.
///
/// At least one of `image_data` (base64) or `image_url` is normally set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_data: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mime_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub storage_path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub job_id: Option<String>,
}

impl ImageRef {
  pub fn from_data(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
    Self {
      image_data: Some(data.into()),
      mime_type: Some(mime_type.into()),
      ..Default::default()
    }
  }

  pub fn from_url(url: impl Into<String>) -> Self {
    Self {
      image_url: Some(url.into()),
      ..Default::default()
    }
  }

  /// Inline data when present, else the URL. This is what backends accept
  /// as a reference image.
  pub fn source(&self) -> Option<&str> {
    self
      .image_data
      .as_deref()
      .or(self.image_url.as_deref())
      .filter(|s| !s.is_empty())
  }

  pub fn is_empty(&self) -> bool {
    self.source().is_none() && self.storage_path.is_none()
  }

  fn write_fields(&self, fields: &mut Map<String, Value>) {
    let pairs = [
      ("image_data", &self.image_data),
      ("image_url", &self.image_url),
      ("mime_type", &self.mime_type),
      ("storage_path", &self.storage_path),
      ("job_id", &self.job_id),
    ];
    for (key, value) in pairs {
      if let Some(value) = value {
        fields.insert(key.to_string(), Value::String(value.clone()));
      }
    }
  }
}

/// A character sheet chosen as a reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRef {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<ImageRef>,
}

/// Output of a successfully executed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
  Text { text: String },
  Image(ImageRef),
  Character(CharacterRef),
  Audio { data: String, mime_type: String },
  Video {
    url: String,
    job_id: Option<String>,
    duration: Option<f64>,
  },
  /// Backend payloads with no dedicated shape (external job outputs).
  Json(Value),
}

impl Artifact {
  pub fn text(text: impl Into<String>) -> Self {
    Artifact::Text { text: text.into() }
  }

  /// Fields addressable from templates, as a JSON object.
  pub fn fields(&self) -> Map<String, Value> {
    let mut fields = Map::new();
    match self {
      Artifact::Text { text } => {
        fields.insert("text".to_string(), Value::String(text.clone()));
        fields.insert("response".to_string(), Value::String(text.clone()));
      }
      Artifact::Image(image) => image.write_fields(&mut fields),
      Artifact::Character(character) => {
        fields.insert("name".to_string(), Value::String(character.name.clone()));
        if let Some(image) = &character.image {
          image.write_fields(&mut fields);
        }
      }
      Artifact::Audio { data, mime_type } => {
        fields.insert("audio_data".to_string(), Value::String(data.clone()));
        fields.insert("mime_type".to_string(), Value::String(mime_type.clone()));
      }
      Artifact::Video {
        url,
        job_id,
        duration,
      } => {
        fields.insert("video_url".to_string(), Value::String(url.clone()));
        if let Some(job_id) = job_id {
          fields.insert("job_id".to_string(), Value::String(job_id.clone()));
        }
        if let Some(duration) = duration {
          fields.insert("duration".to_string(), Value::from(*duration));
        }
      }
      Artifact::Json(Value::Object(map)) => fields = map.clone(),
      Artifact::Json(other) => {
        fields.insert("value".to_string(), other.clone());
      }
    }
    fields
  }

  /// Text used when a template references the whole output (`{{prev}}`).
  pub fn primary_text(&self) -> String {
    match self {
      Artifact::Text { text } => text.clone(),
      Artifact::Image(image) => image.source().unwrap_or_default().to_string(),
      Artifact::Character(character) => character.name.clone(),
      Artifact::Audio { data, .. } => data.clone(),
      Artifact::Video { url, .. } => url.clone(),
      Artifact::Json(Value::String(s)) => s.clone(),
      Artifact::Json(Value::Null) => String::new(),
      Artifact::Json(other) => other.to_string(),
    }
  }

  /// The image carried by this artifact, if it can feed a reference slot.
  pub fn image(&self) -> Option<&ImageRef> {
    match self {
      Artifact::Image(image) if !image.is_empty() => Some(image),
      _ => None,
    }
  }

  pub fn character(&self) -> Option<&CharacterRef> {
    match self {
      Artifact::Character(character) => Some(character),
      _ => None,
    }
  }
}
