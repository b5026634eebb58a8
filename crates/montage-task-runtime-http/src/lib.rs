//! Generation backends reached over HTTP.
//!
//! Synchronous backends answer a single POST with the artifact. Job backends
//! answer with a queue item id and expose its status at `GET {url}/{id}`.
//! [`build_registry`] wires every configured backend into an
//! [`ExecutorRegistry`](montage_task_runtime::ExecutorRegistry).

mod backend;
mod build;
mod external;
mod image;
mod speech;
mod text;
mod video;

pub use build::{build_registry, build_registry_with_client};
pub use external::ExternalWorkflowExecutor;
pub use image::{ImageGenerationExecutor, ImageJobExecutor};
pub use speech::SpeechSynthesisExecutor;
pub use text::TextGenerationExecutor;
pub use video::VideoGenerationExecutor;
