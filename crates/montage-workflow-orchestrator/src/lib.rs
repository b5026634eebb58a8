//! Montage Workflow Orchestrator
//!
//! Runs a locked [`Workflow`](montage_workflow::Workflow) one node at a time
//! in topological order.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              execute_graph / StepRunner                     │
//! │  - apply request inputs, load and update step records       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Orchestrator                           │
//! │  - sort, resolve {{templates}}, fill input slots            │
//! │  - record one ExecutionResult per attempted node            │
//! │  - persist the terminal node's artifact                     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ExecutorRegistry                         │
//! │  - prepare, submit and poll one node                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing node never stops the run. Downstream references to it resolve
//! to empty strings, and only the terminal node decides whether the run
//! succeeded.

mod error;
mod events;
mod input;
mod orchestrator;
mod persist;
mod request;
mod result;
mod step;

pub use error::OrchestratorError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use input::{TemplateContext, build_input, resolve_template};
pub use orchestrator::Orchestrator;
pub use persist::output_record;
pub use request::{ExecuteRequest, ExecuteResponse, NodeOutputView, apply_inputs, execute_graph};
pub use result::{ExecutionResult, NodeStatus, PersistedOutput, ResultSet, WorkflowRun};
pub use step::StepRunner;
