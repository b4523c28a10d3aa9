//! Core types for deployment reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource limits for an application's container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU limit in Kubernetes quantity notation (e.g. "500m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory limit in Kubernetes quantity notation (e.g. "256Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceLimits {
    /// Check if no limit is set
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// Desired state of one application, as declared in a spec file
///
/// Immutable once loaded for a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: u32,
    pub port: u16,
    pub health_check_path: String,
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl ApplicationSpec {
    /// Identity of the service this spec describes
    pub fn target(&self) -> Target {
        Target::new(&self.name, &self.namespace)
    }
}

/// Phase of a single pod, as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse a phase string as reported by Kubernetes
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Observed state of one service in the cluster
///
/// Fetched fresh for every pass and handed to the diff engine by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub name: String,
    pub namespace: String,
    /// Replica count the cluster is currently asked to run
    pub replicas: u32,
    /// Replicas that are currently ready
    #[serde(default)]
    pub ready_replicas: u32,
    #[serde(default)]
    pub pod_phases: Vec<PodPhase>,
    /// Image reference last seen on the running workload
    pub image: String,
}

impl ObservedState {
    /// Observed state matching a spec exactly (what a successful create yields)
    pub fn from_spec(spec: &ApplicationSpec) -> Self {
        Self {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            replicas: spec.replicas,
            ready_replicas: 0,
            pod_phases: Vec::new(),
            image: spec.image.clone(),
        }
    }

    /// Count pods in a given phase
    pub fn pods_in(&self, phase: PodPhase) -> usize {
        self.pod_phases.iter().filter(|p| **p == phase).count()
    }
}

/// Name and namespace of a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub namespace: String,
}

impl Target {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What a reconciliation action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Create the service from its spec
    Create,
    /// Change the replica count by `delta`, ending at `replicas`
    Scale { delta: i64, replicas: u32 },
    /// Roll the workload to a new image reference
    UpdateImage { image: String },
    /// Remove the service
    Delete,
}

impl ActionKind {
    /// Execution rank: lower ranks run first within a pass
    pub fn rank(&self) -> u8 {
        match self {
            Self::Create => 0,
            Self::UpdateImage { .. } => 1,
            Self::Scale { .. } => 2,
            Self::Delete => 3,
        }
    }

    /// Short verb used in logs and listings
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Scale { .. } => "scale",
            Self::UpdateImage { .. } => "update-image",
            Self::Delete => "delete",
        }
    }
}

/// A single reconciliation step against the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub target: Target,
    /// Desired spec, absent only when deleting a service no spec declares
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ApplicationSpec>,
    /// Why the diff engine produced this action
    pub reason: String,
}

impl Action {
    pub fn new(
        kind: ActionKind,
        target: Target,
        spec: Option<ApplicationSpec>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            target,
            spec,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Create => write!(f, "create {}", self.target),
            ActionKind::Scale { delta, replicas } => {
                write!(f, "scale {} to {} ({:+})", self.target, replicas, delta)
            }
            ActionKind::UpdateImage { image } => {
                write!(f, "update {} image to {}", self.target, image)
            }
            ActionKind::Delete => write!(f, "delete {}", self.target),
        }
    }
}

/// Lifecycle of one action within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl ActionState {
    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Failure class reported by a cluster client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Expected to resolve on retry (timeouts, network blips)
    Transient,
    /// Will not resolve on retry (bad permissions, malformed request)
    Permanent,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Outcome of applying one action; append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub action: Action,
    pub state: ActionState,
    pub success: bool,
    /// Cluster calls issued for this action (0 if it never started)
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ReconciliationResult {
    /// Result for an action that was cancelled before it started
    pub fn not_started(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            state: ActionState::Pending,
            success: false,
            attempts: 0,
            error: Some(reason.into()),
            error_kind: None,
        }
    }

    /// Check if the action never left Pending
    pub fn is_not_started(&self) -> bool {
        self.state == ActionState::Pending
    }
}

/// Counters over the results of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub not_started: usize,
}

impl PassSummary {
    pub fn from_results(results: &[ReconciliationResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ReconciliationResult) {
        match result.state {
            ActionState::Succeeded => self.succeeded += 1,
            ActionState::Failed => self.failed += 1,
            ActionState::Pending | ActionState::InProgress => self.not_started += 1,
        }
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &PassSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.not_started += other.not_started;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.not_started
    }

    /// Check if every action succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_started == 0
    }
}

/// Report of one reconciliation pass over a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub namespace: String,
    pub pass_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub timed_out: bool,
    /// Why the pass failed before any action ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<ReconciliationResult>,
}

impl PassReport {
    /// Report of a pass that stopped before planning any action
    pub fn failed(
        namespace: &str,
        pass_id: u64,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            pass_id,
            started_at,
            finished_at: Utc::now(),
            timed_out: false,
            error: Some(error.into()),
            results: Vec::new(),
        }
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary::from_results(&self.results)
    }

    /// Check if the pass ran and every action in it succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.summary().is_success()
    }
}

/// Process exit code for a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// All actions succeeded
    Success = 0,
    /// One or more actions failed after retries
    ActionsFailed = 1,
    /// Spec invalid; no actions attempted
    InvalidSpec = 2,
}

impl ExitStatus {
    /// Exit status for a set of pass reports
    pub fn from_reports(reports: &[PassReport]) -> Self {
        if reports.iter().all(PassReport::is_success) {
            Self::Success
        } else {
            Self::ActionsFailed
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind) -> Action {
        Action::new(kind, Target::new("web", "prod"), None, "test")
    }

    #[test]
    fn test_action_rank_order() {
        let create = ActionKind::Create.rank();
        let update = ActionKind::UpdateImage {
            image: "web:2".into(),
        }
        .rank();
        let scale = ActionKind::Scale {
            delta: 1,
            replicas: 3,
        }
        .rank();
        let delete = ActionKind::Delete.rank();
        assert!(create < update && update < scale && scale < delete);
    }

    #[test]
    fn test_action_display() {
        let scale = action(ActionKind::Scale {
            delta: -2,
            replicas: 1,
        });
        assert_eq!(scale.to_string(), "scale prod/web to 1 (-2)");
        assert_eq!(action(ActionKind::Delete).to_string(), "delete prod/web");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ActionState::Pending.is_terminal());
        assert!(!ActionState::InProgress.is_terminal());
        assert!(ActionState::Succeeded.is_terminal());
        assert!(ActionState::Failed.is_terminal());
    }

    #[test]
    fn test_summary_counts_not_started() {
        let results = vec![
            ReconciliationResult::not_started(action(ActionKind::Create), "cancelled"),
            ReconciliationResult {
                action: action(ActionKind::Delete),
                state: ActionState::Succeeded,
                success: true,
                attempts: 1,
                error: None,
                error_kind: None,
            },
        ];
        let summary = PassSummary::from_results(&results);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.not_started, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::ActionsFailed.code(), 1);
        assert_eq!(ExitStatus::InvalidSpec.code(), 2);
        assert_eq!(ExitStatus::from_reports(&[]), ExitStatus::Success);
    }

    #[test]
    fn test_failed_pass_is_not_success() {
        let report = PassReport::failed("swim", 4, Utc::now(), "cluster unreachable");
        assert!(report.results.is_empty());
        assert!(report.summary().is_success());
        assert!(!report.is_success());
        assert_eq!(
            ExitStatus::from_reports(&[report]),
            ExitStatus::ActionsFailed
        );
    }

    #[test]
    fn test_pod_phase_parse() {
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("CrashLoop"), PodPhase::Unknown);
    }
}
