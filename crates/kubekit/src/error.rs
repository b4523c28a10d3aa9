//! Error types for kubectl operations.
//!
//! kubectl reports almost everything through a non-zero exit and a line on
//! stderr. Those lines are classified into categories so the reconciler can
//! tell a flaky API server from a request that will never succeed.

use converge::ClusterError;
use thiserror::Error;

/// Categories of kubectl errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// API server unreachable, connection reset, TLS failure
    Network,
    /// Request or server-side timeout
    Timeout,
    /// Optimistic-concurrency conflict on update
    Conflict,
    /// 5xx or throttling response from the API server
    Server,
    /// Object does not exist
    NotFound,
    /// Object exists already
    AlreadyExists,
    /// Credentials rejected or RBAC denied
    Forbidden,
    /// Manifest or argument rejected by validation
    Invalid,
    /// kubectl not installed
    KubectlNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Conflict | Self::Server
        )
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Cluster unreachable",
            Self::Timeout => "Request timed out",
            Self::Conflict => "Object modified concurrently",
            Self::Server => "API server error",
            Self::NotFound => "Object not found",
            Self::AlreadyExists => "Object already exists",
            Self::Forbidden => "Access denied",
            Self::Invalid => "Invalid request",
            Self::KubectlNotFound => "kubectl not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the cluster is running and the kube context is correct",
            Self::Timeout => "Retry later or raise request_timeout_secs",
            Self::Conflict => "Retry; another writer updated the object",
            Self::Server => "Check API server health and retry",
            Self::NotFound => "Check the namespace exists and the service was created",
            Self::AlreadyExists => "Remove the existing object or let berth manage it",
            Self::Forbidden => "Check credentials and RBAC permissions for the namespace",
            Self::Invalid => "Check the application spec values",
            Self::KubectlNotFound => "Install kubectl or set cluster.kubectl in the config",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during kubectl operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("server error: {message}")]
    Server { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("invalid: {message}")]
    Invalid { message: String },

    /// kubectl is not installed or not found in PATH
    #[error("kubectl not found in PATH")]
    KubectlNotFound,

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

const NETWORK_MARKERS: &[&str] = &[
    "unable to connect to the server",
    "the connection to the server",
    "connection refused",
    "connection reset",
    "no route to host",
    "no such host",
    "tls handshake",
    "broken pipe",
    "unexpected eof",
];

const TIMEOUT_MARKERS: &[&str] = &[
    "i/o timeout",
    "timed out",
    "timeout",
    "deadline exceeded",
];

const SERVER_MARKERS: &[&str] = &[
    "internal error",
    "internalerror",
    "service unavailable",
    "serviceunavailable",
    "too many requests",
    "etcdserver",
    "(503)",
    "(500)",
    "(429)",
];

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Server { .. } => ErrorCategory::Server,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Error::Forbidden { .. } => ErrorCategory::Forbidden,
            Error::Invalid { .. } => ErrorCategory::Invalid,
            Error::KubectlNotFound => ErrorCategory::KubectlNotFound,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from kubectl stderr.
    ///
    /// `resource` names the object the command targeted, for not-found and
    /// already-exists messages.
    pub fn from_kubectl_output(stderr: &str, resource: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();
        let target = || resource.unwrap_or("unknown").to_string();
        let has = |markers: &[&str]| markers.iter().any(|m| stderr_lower.contains(m));

        if has(NETWORK_MARKERS) {
            return Error::Network { message };
        }

        if has(TIMEOUT_MARKERS) {
            return Error::Timeout { message };
        }

        if stderr_lower.contains("the object has been modified")
            || stderr_lower.contains("operation cannot be fulfilled")
        {
            return Error::Conflict { message };
        }

        if has(SERVER_MARKERS) {
            return Error::Server { message };
        }

        if stderr_lower.contains("forbidden")
            || stderr_lower.contains("unauthorized")
            || stderr_lower.contains("must be logged in")
        {
            return Error::Forbidden { message };
        }

        if stderr_lower.contains("alreadyexists") || stderr_lower.contains("already exists") {
            return Error::AlreadyExists {
                resource: target(),
            };
        }

        if stderr_lower.contains("notfound") || stderr_lower.contains("not found") {
            return Error::NotFound {
                resource: target(),
            };
        }

        if stderr_lower.contains("is invalid")
            || stderr_lower.contains("error validating")
            || stderr_lower.contains("invalid value")
            || stderr_lower.contains("unknown flag")
        {
            return Error::Invalid { message };
        }

        Error::CommandFailed {
            message: format!(
                "kubectl command failed{}",
                resource.map(|r| format!(" for {r}")).unwrap_or_default()
            ),
            stderr: message,
        }
    }
}

impl From<Error> for ClusterError {
    fn from(err: Error) -> Self {
        if err.is_retryable() {
            ClusterError::transient(err.to_string())
        } else {
            ClusterError::permanent(err.to_string())
        }
    }
}

/// Result type for kubectl operations.
pub type Result<T> = std::result::Result<T, Error>;
