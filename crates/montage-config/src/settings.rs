//! Engine settings.
//!
//! Every field has a default so an empty JSON object (or no file at all) is
//! a valid configuration:
//!
//! ```json
//! {
//!   "poll": { "interval_ms": 5000, "max_attempts": 60 },
//!   "http": { "timeout_ms": 120000 },
//!   "backends": {
//!     "text_generation": { "url": "http://localhost:3000/api/gemini", "api_key_env": "GEMINI_API_KEY" },
//!     "video_generation": { "url": "http://localhost:3000/api/higgsfield" }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Top-level settings for one engine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  pub poll: PollSettings,
  pub http: HttpSettings,
  pub backends: BackendSettings,
  /// Database URL for step records and persisted outputs.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_url: Option<String>,
}

/// Job polling cadence. Constant interval, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
  pub interval_ms: u64,
  pub max_attempts: u32,
}

impl Default for PollSettings {
  fn default() -> Self {
    Self {
      interval_ms: 5_000,
      max_attempts: 60,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
  /// Per-request timeout for backend calls.
  pub timeout_ms: u64,
}

impl Default for HttpSettings {
  fn default() -> Self {
    Self { timeout_ms: 120_000 }
  }
}

/// One backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
  pub url: String,
  /// Name of the environment variable holding the API key, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key_env: Option<String>,
}

/// Endpoints per backend-driven node type. A missing entry means the node
/// type is not registered and such nodes fail as unknown types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text_generation: Option<EndpointSettings>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_generation: Option<EndpointSettings>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_generation_job: Option<EndpointSettings>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub speech_synthesis: Option<EndpointSettings>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub video_generation: Option<EndpointSettings>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_job_workflow: Option<EndpointSettings>,
}
