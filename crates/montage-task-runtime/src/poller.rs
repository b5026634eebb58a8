//! Job polling.
//!
//! [`JobPoller`] is a plain state machine: feed it one observation per poll
//! and it says whether to wait for the next tick or stop. It never sleeps.
//! [`poll_until_terminal`] drives it with a constant-interval ticker and a
//! cancellation token.

use std::time::Duration;

use montage_config::PollSettings;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::executor::NodeExecutor;
use crate::queue::{QueueItem, QueueStatus};

/// Where a polled job stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
  Queued,
  Processing,
  Completed,
  Failed,
  TimedOut,
  Cancelled,
}

impl PollState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      PollState::Completed | PollState::Failed | PollState::TimedOut | PollState::Cancelled
    )
  }
}

/// What to do after an observation.
#[derive(Debug)]
pub enum PollStep {
  /// Poll again on the next tick.
  Wait,
  /// The job is finished, one way or another.
  Done(Result<QueueItem, NodeError>),
}

#[derive(Debug, Clone)]
pub struct JobPoller {
  job_id: String,
  state: PollState,
  attempts: u32,
  max_attempts: u32,
  interval: Duration,
  last_error: Option<String>,
}

impl JobPoller {
  pub fn new(job_id: impl Into<String>, settings: PollSettings) -> Self {
    Self {
      job_id: job_id.into(),
      state: PollState::Queued,
      attempts: 0,
      max_attempts: settings.max_attempts.max(1),
      interval: Duration::from_millis(settings.interval_ms.max(1)),
      last_error: None,
    }
  }

  pub fn job_id(&self) -> &str {
    &self.job_id
  }

  pub fn state(&self) -> PollState {
    self.state
  }

  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  /// Record the outcome of one poll.
  ///
  /// Every observation uses up one attempt. An unreachable backend leaves
  /// the state unchanged and is polled again; any other poll error (the
  /// backend rejected or lost the job) ends the job.
  pub fn advance(&mut self, observation: Result<QueueItem, NodeError>) -> PollStep {
    if self.state.is_terminal() {
      return PollStep::Done(Err(NodeError::backend(format!(
        "job '{}' already finished",
        self.job_id
      ))));
    }

    self.attempts += 1;

    match observation {
      Ok(item) => {
        self.last_error = None;
        debug!(
          job_id = %self.job_id,
          attempt = self.attempts,
          status = ?item.status,
          "job_polled"
        );
        match item.status {
          QueueStatus::Pending | QueueStatus::Queued => self.state = PollState::Queued,
          QueueStatus::Processing => self.state = PollState::Processing,
          QueueStatus::Completed => {
            self.state = PollState::Completed;
            return PollStep::Done(Ok(item));
          }
          QueueStatus::Failed => {
            self.state = PollState::Failed;
            let message = item
              .error_message
              .clone()
              .filter(|m| !m.is_empty())
              .unwrap_or_else(|| format!("job '{}' failed", self.job_id));
            return PollStep::Done(Err(NodeError::Backend {
              message,
              details: item.output_payload,
            }));
          }
        }
      }
      Err(err) if err.is_retryable() => {
        warn!(
          job_id = %self.job_id,
          attempt = self.attempts,
          error = %err,
          "job_poll_failed"
        );
        self.last_error = Some(err.to_string());
      }
      Err(err) => {
        warn!(
          job_id = %self.job_id,
          attempt = self.attempts,
          error = %err,
          "job_poll_rejected"
        );
        self.state = PollState::Failed;
        return PollStep::Done(Err(err));
      }
    }

    if self.attempts >= self.max_attempts {
      self.state = PollState::TimedOut;
      return PollStep::Done(Err(NodeError::Timeout {
        attempts: self.attempts,
        // First poll is immediate.
        elapsed: self.interval * (self.attempts - 1),
        last_error: self.last_error.take(),
      }));
    }

    PollStep::Wait
  }

  pub fn cancel(&mut self) -> NodeError {
    self.state = PollState::Cancelled;
    NodeError::Cancelled
  }
}

/// Poll `job_id` through `executor` until it completes, fails, runs out of
/// attempts or `cancel` fires. The first poll happens immediately.
pub async fn poll_until_terminal(
  executor: &dyn NodeExecutor,
  job_id: &str,
  settings: PollSettings,
  cancel: &CancellationToken,
) -> Result<QueueItem, NodeError> {
  let mut poller = JobPoller::new(job_id, settings);
  let mut ticker = tokio::time::interval(poller.interval());
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(poller.cancel()),
      _ = ticker.tick() => {}
    }

    let observation = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(poller.cancel()),
      result = executor.poll(job_id) => result,
    };

    match poller.advance(observation) {
      PollStep::Wait => continue,
      PollStep::Done(result) => return result,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(max_attempts: u32) -> PollSettings {
    PollSettings {
      interval_ms: 5_000,
      max_attempts,
    }
  }

  fn status(status: QueueStatus) -> Result<QueueItem, NodeError> {
    Ok(QueueItem::new("job", status))
  }

  #[test]
  fn test_processing_then_completed() {
    let mut poller = JobPoller::new("job", settings(10));

    assert!(matches!(poller.advance(status(QueueStatus::Queued)), PollStep::Wait));
    assert_eq!(poller.state(), PollState::Queued);
    assert!(matches!(poller.advance(status(QueueStatus::Processing)), PollStep::Wait));
    assert_eq!(poller.state(), PollState::Processing);

    let done = poller.advance(status(QueueStatus::Completed));
    assert!(matches!(done, PollStep::Done(Ok(_))));
    assert_eq!(poller.state(), PollState::Completed);
    assert_eq!(poller.attempts(), 3);
  }

  #[test]
  fn test_failed_carries_error_message() {
    let mut poller = JobPoller::new("job", settings(10));
    let item = QueueItem::new("job", QueueStatus::Failed).with_error("content filtered");

    match poller.advance(Ok(item)) {
      PollStep::Done(Err(NodeError::Backend { message, .. })) => {
        assert_eq!(message, "content filtered");
      }
      other => panic!("unexpected step: {other:?}"),
    }
    assert_eq!(poller.state(), PollState::Failed);
  }

  #[test]
  fn test_budget_exhausted_is_timeout() {
    let mut poller = JobPoller::new("job", settings(3));
    assert!(matches!(poller.advance(status(QueueStatus::Processing)), PollStep::Wait));
    assert!(matches!(poller.advance(status(QueueStatus::Processing)), PollStep::Wait));

    match poller.advance(status(QueueStatus::Processing)) {
      PollStep::Done(Err(NodeError::Timeout {
        attempts,
        elapsed,
        last_error,
      })) => {
        assert_eq!(attempts, 3);
        assert_eq!(elapsed, Duration::from_secs(10));
        assert!(last_error.is_none());
      }
      other => panic!("unexpected step: {other:?}"),
    }
    assert_eq!(poller.state(), PollState::TimedOut);
  }

  #[test]
  fn test_transport_error_consumes_attempt() {
    let mut poller = JobPoller::new("job", settings(2));
    let step = poller.advance(Err(NodeError::Transport("connection reset".to_string())));
    assert!(matches!(step, PollStep::Wait));
    assert_eq!(poller.attempts(), 1);
    assert_eq!(poller.state(), PollState::Queued);

    let step = poller.advance(Err(NodeError::Transport("connection refused".to_string())));
    match step {
      PollStep::Done(Err(NodeError::Timeout { last_error, .. })) => {
        assert_eq!(last_error.as_deref(), Some("backend unreachable: connection refused"));
      }
      other => panic!("unexpected step: {other:?}"),
    }
  }

  #[test]
  fn test_rejected_poll_ends_job() {
    let mut poller = JobPoller::new("gone", settings(10));
    assert!(matches!(poller.advance(status(QueueStatus::Processing)), PollStep::Wait));

    let lost = NodeError::Backend {
      message: "job not found".to_string(),
      details: None,
    };
    match poller.advance(Err(lost)) {
      PollStep::Done(Err(NodeError::Backend { message, .. })) => assert_eq!(message, "job not found"),
      other => panic!("unexpected step: {other:?}"),
    }
    assert_eq!(poller.state(), PollState::Failed);
    assert_eq!(poller.attempts(), 2);
  }

  #[test]
  fn test_no_advance_after_terminal() {
    let mut poller = JobPoller::new("job", settings(5));
    let _ = poller.advance(status(QueueStatus::Completed));
    assert!(matches!(
      poller.advance(status(QueueStatus::Processing)),
      PollStep::Done(Err(_))
    ));
    assert_eq!(poller.attempts(), 1);
  }

  #[test]
  fn test_zero_settings_are_clamped() {
    let poller = JobPoller::new(
      "job",
      PollSettings {
        interval_ms: 0,
        max_attempts: 0,
      },
    );
    assert_eq!(poller.interval(), Duration::from_millis(1));
    let mut poller = poller;
    assert!(matches!(
      poller.advance(status(QueueStatus::Processing)),
      PollStep::Done(Err(NodeError::Timeout { attempts: 1, .. }))
    ));
  }
}
