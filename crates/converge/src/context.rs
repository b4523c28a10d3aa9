//! Reconcile options and progress callbacks
//!
//! The callbacks let a front end show progress without this crate
//! depending on any terminal UI.

use crate::retry::RetryConfig;
use crate::types::{Action, PassReport, ReconciliationResult};
use std::time::Duration;

/// Default time budget of one pass
pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Options for reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Retry policy for transient cluster errors
    pub retry: RetryConfig,
    /// Time budget per pass; `None` disables the limit
    pub pass_timeout: Option<Duration>,
    /// Number of namespaces reconciled concurrently
    pub jobs: usize,
    /// Delete managed services that no spec declares
    pub prune: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            pass_timeout: Some(DEFAULT_PASS_TIMEOUT),
            jobs: 4,
            prune: false,
        }
    }
}

/// Progress callback for reconciliation passes
///
/// Passes for different namespaces run on different threads, so
/// implementations must be thread-safe.
pub trait ProgressCallback: Send + Sync {
    /// Called once the plan for a namespace is known
    fn on_pass_start(&self, namespace: &str, actions: usize);

    /// Called before the first attempt of an action
    fn on_action_start(&self, namespace: &str, action: &Action);

    /// Called when an action reaches a final state or is skipped
    fn on_action_complete(&self, namespace: &str, result: &ReconciliationResult);

    /// Called when a pass finishes
    fn on_pass_complete(&self, report: &PassReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_pass_start(&self, _namespace: &str, _actions: usize) {}
    fn on_action_start(&self, _namespace: &str, _action: &Action) {}
    fn on_action_complete(&self, _namespace: &str, _result: &ReconciliationResult) {}
    fn on_pass_complete(&self, _report: &PassReport) {}
}
