//! Configuration file (~/.config/berth/config.toml)
//!
//! Every section and key is optional; a missing file yields defaults.

use anyhow::{Context, Result};
use converge::{ReconcileOptions, RetryConfig};
use kubekit::KubectlClient;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("berth"))
}

/// Resolve the config file: explicit path first, then the default location
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config_dir()?.join("config.toml")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    pub cluster: ClusterSection,
    pub reconcile: ReconcileSection,
    pub retry: RetrySection,
    pub state: StateSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// kubectl binary; looked up in PATH when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubectl: Option<String>,
    /// Kube context; the current context when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            kubectl: None,
            context: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    /// 0 disables the pass time limit
    pub pass_timeout_secs: u64,
    pub jobs: usize,
    pub prune: bool,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            pass_timeout_secs: 300,
            jobs: 4,
            prune: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub dir: String,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            dir: "~/.local/state/berth".to_string(),
        }
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub prune: bool,
}

impl BerthConfig {
    /// Load config from `path`, or return defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    /// State directory with `~` expanded
    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state.dir).into_owned())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Reconcile options with command-line overrides applied
    pub fn reconcile_options(&self, overrides: Overrides) -> ReconcileOptions {
        let timeout = overrides
            .timeout_secs
            .unwrap_or(self.reconcile.pass_timeout_secs);
        ReconcileOptions {
            retry: self.retry(),
            pass_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            jobs: overrides.jobs.unwrap_or(self.reconcile.jobs).max(1),
            prune: overrides.prune || self.reconcile.prune,
        }
    }

    /// kubectl client for the configured binary and context
    pub fn kubectl_client(&self) -> Result<KubectlClient> {
        let client = match &self.cluster.kubectl {
            Some(path) => KubectlClient::with_path(shellexpand::tilde(path).into_owned()),
            None => KubectlClient::new()?,
        };
        let timeout = self.cluster.request_timeout_secs;
        Ok(client
            .with_context(self.cluster.context.clone())
            .with_request_timeout((timeout > 0).then(|| Duration::from_secs(timeout))))
    }
}
