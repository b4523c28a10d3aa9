//! Error types for reconciliation.
//!
//! Spec errors are local and never retried. Cluster errors carry an
//! [`ErrorKind`] so the executor can decide whether another attempt is
//! worthwhile.

use crate::types::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a cluster client call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} cluster error: {message}")]
pub struct ClusterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClusterError {
    /// Failure expected to resolve on retry
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Failure that will not resolve on retry
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors that can occur while loading specs or running a pass
#[derive(Debug, Error)]
pub enum Error {
    /// Spec failed validation; blocks the whole pass
    #[error("invalid spec in {source_name}: {message}")]
    InvalidSpec {
        /// File or label the spec came from
        source_name: String,
        /// What was wrong
        message: String,
    },

    /// Spec source does not exist
    #[error("spec source not found: {0}")]
    SourceNotFound(PathBuf),

    /// Observed state could not be fetched, so no plan could be made
    #[error("failed to observe namespace {namespace}: {source}")]
    Observe {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn invalid(source_name: &str, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error is a spec validation failure
    pub fn is_invalid_spec(&self) -> bool {
        matches!(self, Self::InvalidSpec { .. } | Self::SourceNotFound(_))
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
