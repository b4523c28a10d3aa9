//! # kubekit
//!
//! `kubectl`-backed implementation of [`converge::ClusterClient`].
//!
//! This crate provides:
//! - Manifest rendering for a Deployment plus Service per application
//! - Parsing of `kubectl get -o json` output into observed state
//! - Classification of kubectl failures into transient and permanent errors
//!
//! ## Example
//!
//! ```no_run
//! use converge::{NoProgress, ReconcileOptions, Reconciler};
//! use kubekit::KubectlClient;
//! use std::path::Path;
//!
//! let client = KubectlClient::new()
//!     .expect("kubectl not available")
//!     .with_context(Some("kind-dev".to_string()));
//!
//! let specs = converge::loader::load(Path::new("apps.toml")).unwrap();
//! let reconciler = Reconciler::new(client, ReconcileOptions::default());
//! let reports = reconciler.reconcile_all(&specs, &NoProgress).unwrap();
//! ```

pub mod error;
pub mod kubectl;
pub mod manifest;
pub mod observe;

pub use error::{Error, ErrorCategory, Result};
pub use kubectl::KubectlClient;
