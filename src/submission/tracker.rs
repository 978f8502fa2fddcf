use tracing::{debug, info};

use crate::backend::RecordRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    ResolvingAssets,
    Uploading { index: usize, total: usize },
    Persisting,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Pending(SubmissionStage),
    Success(RecordRef),
    Failure(String),
}

/// Forward-only submission state machine for one wizard.
///
/// `Idle -> Pending -> Success | Failure`; a failed attempt may start again,
/// a successful one may not.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTracker {
    state: SubmissionState,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SubmissionState::Pending(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, SubmissionState::Success(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            SubmissionState::Failure(message) => Some(message),
            _ => None,
        }
    }

    /// Starts an attempt. Returns `false` while one is pending or after success.
    pub fn try_begin(&mut self) -> bool {
        match self.state {
            SubmissionState::Pending(_) | SubmissionState::Success(_) => {
                debug!(state = ?self.state, "ignored submit request");
                false
            }
            SubmissionState::Idle | SubmissionState::Failure(_) => {
                self.state = SubmissionState::Pending(SubmissionStage::ResolvingAssets);
                true
            }
        }
    }

    pub fn enter(&mut self, stage: SubmissionStage) {
        if self.is_pending() {
            info!(?stage, "submission stage");
            self.state = SubmissionState::Pending(stage);
        }
    }

    pub fn succeed(&mut self, reference: RecordRef) {
        if self.is_pending() {
            self.state = SubmissionState::Success(reference);
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_pending() {
            self.state = SubmissionState::Failure(message.into());
        }
    }

    /// Drops a failure message so the form returns to `Idle`.
    pub fn reset(&mut self) {
        if let SubmissionState::Failure(_) = self.state {
            self.state = SubmissionState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> RecordRef {
        RecordRef {
            table: "listings".into(),
            id: "1".into(),
        }
    }

    #[test]
    fn second_begin_while_pending_is_refused() {
        let mut tracker = SubmissionTracker::new();
        assert!(tracker.try_begin());
        assert!(!tracker.try_begin());
        assert!(tracker.is_pending());
    }

    #[test]
    fn failure_allows_retry() {
        let mut tracker = SubmissionTracker::new();
        tracker.try_begin();
        tracker.fail("Failed to upload image: timeout");
        assert_eq!(tracker.failure(), Some("Failed to upload image: timeout"));
        assert!(tracker.try_begin());
        assert_eq!(tracker.failure(), None);
    }

    #[test]
    fn success_is_terminal() {
        let mut tracker = SubmissionTracker::new();
        tracker.try_begin();
        tracker.succeed(reference());
        assert!(!tracker.try_begin());
        tracker.fail("late failure");
        tracker.reset();
        assert_eq!(tracker.state(), &SubmissionState::Success(reference()));
    }

    #[test]
    fn transitions_require_a_pending_attempt() {
        let mut tracker = SubmissionTracker::new();
        tracker.succeed(reference());
        tracker.enter(SubmissionStage::Persisting);
        assert_eq!(tracker.state(), &SubmissionState::Idle);
    }

    #[test]
    fn reset_returns_failure_to_idle() {
        let mut tracker = SubmissionTracker::new();
        tracker.try_begin();
        tracker.fail("boom");
        tracker.reset();
        assert_eq!(tracker.state(), &SubmissionState::Idle);
    }
}
