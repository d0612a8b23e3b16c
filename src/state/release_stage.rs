//! Per-release stage machine
//!
//! Discovered → Parsed → Queued → Downloaded → Patched → Published → CleanedUp
//! → {Succeeded | FailedRetryable}, with Rejected for bodies that never parse.

use serde::{Deserialize, Serialize};

use super::TerminalState;

/// Stage of one upstream release within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStage {
    /// Fetched from the source repository
    Discovered,
    /// Body yielded app, version and asset name
    Parsed,
    /// In the ledger's pending queue
    Queued,
    /// Asset bytes in the scratch directory
    Downloaded,
    /// Decrypted, unlocked and re-encrypted
    Patched,
    /// Downstream release exists
    Published,
    /// Scratch files removed
    CleanedUp,
    Succeeded,
    /// Left pending for the next run
    FailedRetryable,
    /// Body can never be parsed; marked processed
    Rejected,
}

impl TerminalState for ReleaseStage {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseStage::Succeeded | ReleaseStage::FailedRetryable | ReleaseStage::Rejected
        )
    }
}

impl ReleaseStage {
    /// Check if transition from this stage to target is valid
    pub fn can_transition_to(&self, target: ReleaseStage) -> bool {
        use ReleaseStage::*;
        match (self, target) {
            (Discovered, Parsed) | (Discovered, Rejected) => true,
            (Parsed, Queued) => true,

            (Queued, Downloaded) => true,
            // Already created downstream by an earlier, interrupted run
            (Queued, Published) => true,
            (Downloaded, Patched) => true,
            (Patched, Published) => true,

            // Cleanup runs on every exit path once work has started
            (Queued | Downloaded | Patched | Published, CleanedUp) => true,

            (CleanedUp, Succeeded) | (CleanedUp, FailedRetryable) => true,

            _ => false,
        }
    }
}

/// Invalid stage transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid release stage transition: {from:?} -> {to:?}")]
pub struct StageError {
    pub from: ReleaseStage,
    pub to: ReleaseStage,
}

/// Stages one release passed through, for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTrace {
    pub release_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub stages: Vec<ReleaseStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReleaseTrace {
    pub fn new(release_id: u64, start: ReleaseStage) -> Self {
        Self {
            release_id,
            tag: None,
            stages: vec![start],
            error: None,
        }
    }

    pub fn current(&self) -> ReleaseStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(ReleaseStage::Discovered)
    }

    /// Move to `next`, rejecting transitions the machine does not allow.
    pub fn advance(&mut self, next: ReleaseStage) -> Result<(), StageError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(StageError { from, to: next });
        }
        self.stages.push(next);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut trace = ReleaseTrace::new(1, ReleaseStage::Queued);
        for stage in [
            ReleaseStage::Downloaded,
            ReleaseStage::Patched,
            ReleaseStage::Published,
            ReleaseStage::CleanedUp,
            ReleaseStage::Succeeded,
        ] {
            trace.advance(stage).unwrap();
        }
        assert!(trace.is_terminal());
        assert_eq!(trace.stages.len(), 6);
    }

    #[test]
    fn test_failure_must_clean_up_first() {
        let mut trace = ReleaseTrace::new(1, ReleaseStage::Queued);
        trace.advance(ReleaseStage::Downloaded).unwrap();

        let err = trace.advance(ReleaseStage::FailedRetryable).unwrap_err();
        assert_eq!(err.from, ReleaseStage::Downloaded);

        trace.advance(ReleaseStage::CleanedUp).unwrap();
        trace.advance(ReleaseStage::FailedRetryable).unwrap();
        assert!(trace.is_terminal());
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        for terminal in [
            ReleaseStage::Succeeded,
            ReleaseStage::FailedRetryable,
            ReleaseStage::Rejected,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(ReleaseStage::Queued));
            assert!(!terminal.can_transition_to(ReleaseStage::CleanedUp));
        }
    }

    #[test]
    fn test_cannot_publish_unpatched_download() {
        assert!(!ReleaseStage::Downloaded.can_transition_to(ReleaseStage::Published));
    }
}
