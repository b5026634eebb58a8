//! Montage Workflow
//!
//! This crate provides the "locked" workflow representation for montage.
//! A locked workflow is an immutable, validated snapshot of one graph that
//! is ready for execution.
//!
//! Key differences from `montage-config`:
//! - Node ids are unique and every edge references nodes in the same graph
//! - Type tags are parsed into [`NodeType`] once, up front
//! - The adjacency structure is built once and can produce a deterministic
//!   topological order (Kahn's algorithm, declaration-order tie-break)

mod error;
mod graph;
mod node;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{Edge, InputSlot, Node, NodeType, SlotLimits};
pub use workflow::Workflow;
