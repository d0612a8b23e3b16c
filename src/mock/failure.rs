//! Failure injection for the in-memory collaborators.
//!
//! Lets tests script errors per operation, optionally only for the first
//! few calls, and counts every call so tests can assert on traffic.

use std::collections::HashMap;

use crate::clients::ClientError;

/// A collaborator operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListReleases,
    FetchAsset,
    CreateRelease,
    MarkOutdated,
    FindRelease,
    SubmitPost,
    EditPost,
    GetPost,
    GetComments,
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to return
    pub error: ClientError,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn error(error: ClientError) -> Self {
        Self {
            error,
            fail_count: None,
        }
    }

    /// A retryable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::error(ClientError::Transient(message.into()))
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-operation failure scripts and call counters
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Op, FailureConfig>,
    /// Calls since the failure for an op was injected
    failing_calls: HashMap<Op, u32>,
    /// All calls, injected or not
    calls: HashMap<Op, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation
    pub fn inject(&mut self, op: Op, config: FailureConfig) {
        self.configs.insert(op, config);
        self.failing_calls.insert(op, 0);
    }

    /// Clear all failure injections. Call counts are kept.
    pub fn clear(&mut self) {
        self.configs.clear();
        self.failing_calls.clear();
    }

    pub fn clear_op(&mut self, op: Op) {
        self.configs.remove(&op);
        self.failing_calls.remove(&op);
    }

    /// Record a call to `op` and return the error it should fail with, if any.
    pub fn check(&mut self, op: Op) -> Option<ClientError> {
        *self.calls.entry(op).or_insert(0) += 1;

        let config = self.configs.get(&op)?;
        let count = self.failing_calls.entry(op).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }
        Some(config.error.clone())
    }

    /// How many times `op` has been called
    pub fn calls(&self, op: Op) -> u32 {
        self.calls.get(&op).copied().unwrap_or(0)
    }
}
