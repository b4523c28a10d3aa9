//! # converge
//!
//! Multi-namespace deployment reconciliation.
//!
//! This crate loads declarative application specs, compares them with what
//! a cluster reports, and issues the actions that close the gap.
//!
//! ## Core Concepts
//!
//! - **ApplicationSpec**: Desired state of one service, loaded by [`loader`]
//! - **ObservedState**: What the cluster reports for a service
//! - **Action**: Create, scale, update-image or delete, produced by [`diff`]
//! - **Reconciler**: Runs passes per namespace, serialized within a namespace
//!   and concurrent across namespaces
//!
//! ## Example
//!
//! ```no_run
//! use converge::{InMemoryCluster, NoProgress, ReconcileOptions, Reconciler};
//! use std::path::Path;
//!
//! let specs = converge::loader::load(Path::new("apps.toml")).unwrap();
//! let reconciler = Reconciler::new(InMemoryCluster::new(), ReconcileOptions::default());
//!
//! for report in reconciler.reconcile_all(&specs, &NoProgress).unwrap() {
//!     let report = report.unwrap();
//!     println!("{}: {:?}", report.namespace, report.summary());
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`ClusterClient`]: Observes and mutates a cluster
//! - [`ProgressCallback`]: Receives pass and action progress
//! - [`RetryCallback`]: Notified before each retry

pub mod audit;
pub mod cancel;
pub mod client;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod lease;
pub mod loader;
pub mod memory;
pub mod planner;
pub mod reconciler;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use audit::{AuditEntry, AuditLog};
pub use cancel::{CancelToken, PassDeadline};
pub use client::{ClusterClient, ClusterResult};
pub use context::{NoProgress, ProgressCallback, ReconcileOptions};
pub use diff::{DiffSummary, diff, diff_namespace};
pub use error::{ClusterError, Error, Result};
pub use lease::{LeaseRegistry, NamespaceLease};
pub use memory::InMemoryCluster;
pub use planner::{NamespacePlan, filter_by_target, group_by_namespace};
pub use reconciler::Reconciler;
pub use retry::{LogCallback, NoCallback, RetryCallback, RetryConfig};
pub use types::{
    Action, ActionKind, ActionState, ApplicationSpec, ErrorKind, ExitStatus, ObservedState,
    PassReport, PassSummary, PodPhase, ReconciliationResult, ResourceLimits, Target,
};
