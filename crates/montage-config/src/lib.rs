//! Montage Config
//!
//! This crate contains the serializable configuration types for montage.
//! These types represent workflow graphs before they are validated and
//! locked by `montage-workflow`, plus the engine settings consumed by the
//! orchestrator and the HTTP backends.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `montage run workflow graph.json`)
//! - Database storage (as JSON blobs on the `workflows` table)

mod edge;
mod inputs;
mod node;
mod settings;
mod workflow;

pub use edge::EdgeDef;
pub use inputs::WorkflowInputs;
pub use node::NodeDef;
pub use settings::{BackendSettings, EndpointSettings, EngineSettings, HttpSettings, PollSettings};
pub use workflow::WorkflowDef;
