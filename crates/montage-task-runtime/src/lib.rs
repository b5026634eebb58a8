//! Node execution for montage workflows.
//!
//! A [`NodeExecutor`] knows how to turn one node's resolved input into an
//! [`Artifact`], either in a single call or by submitting a job and polling
//! it. The [`ExecutorRegistry`] maps node types to executors and drives the
//! prepare/submit/poll sequence, including the [`JobPoller`] state machine.

mod artifact;
mod builtin;
mod error;
mod executor;
mod poller;
mod queue;
mod registry;

pub use artifact::{Artifact, CharacterRef, ImageRef};
pub use builtin::{StaticCharacterExecutor, StaticImageExecutor, TextInputExecutor};
pub use error::{ErrorKind, NodeError};
pub use executor::{NodeExecutor, NodeInput, Submission};
pub use poller::{JobPoller, PollState, PollStep, poll_until_terminal};
pub use queue::{QueueItem, QueueStatus};
pub use registry::{ExecutorRegistry, NodeOutcome};
