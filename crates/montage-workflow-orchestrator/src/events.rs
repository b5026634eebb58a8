//! Execution events and notifiers.
//!
//! Events are emitted while a workflow runs so that consumers can observe
//! per-node progress (`idle → running → completed | failed | cancelled`),
//! stream it to a UI, or just log it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  WorkflowStarted {
    execution_id: String,
    workflow_id: String,
  },

  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  /// `data` holds the artifact's template fields.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    data: serde_json::Value,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
  },

  NodeCancelled {
    execution_id: String,
    node_id: String,
  },

  /// Every sorted node was attempted. `success` follows the terminal node.
  WorkflowCompleted { execution_id: String, success: bool },

  /// The workflow was rejected before any node ran.
  WorkflowFailed { execution_id: String, error: String },

  WorkflowCancelled { execution_id: String },
}

/// Receives execution events.
///
/// The orchestrator calls `notify` for each event. Implementations decide
/// what to do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Event volume is a handful per node, so the channel stays unbounded and
/// the run never waits on a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_notifier_forwards() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: "e".to_string(),
      node_id: "a".to_string(),
    });

    assert_eq!(
      rx.try_recv().unwrap(),
      ExecutionEvent::NodeStarted {
        execution_id: "e".to_string(),
        node_id: "a".to_string(),
      }
    );
  }

  #[test]
  fn test_channel_notifier_ignores_dropped_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(ExecutionEvent::WorkflowCancelled {
      execution_id: "e".to_string(),
    });
  }

  #[test]
  fn test_event_serialization_is_tagged() {
    let json = serde_json::to_value(ExecutionEvent::WorkflowCompleted {
      execution_id: "e".to_string(),
      success: false,
    })
    .unwrap();
    assert_eq!(json["event"], "workflow_completed");
    assert_eq!(json["success"], false);
  }
}
