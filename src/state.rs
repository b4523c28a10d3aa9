//! Persisted pass results (state.toml in the state directory)
//!
//! `berth status` reads this file, so results outlive the process that
//! produced them. Only the latest pass per namespace is kept; the full
//! history lives in the audit log next to it. Writers merge under an
//! exclusive lock on `state.lock`, so concurrent runs keep each other's
//! namespaces.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use converge::PassReport;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// State file name inside the state directory
const STATE_FILE: &str = "state.toml";

/// Audit log file name inside the state directory
const AUDIT_FILE: &str = "audit.jsonl";

/// Guards read-modify-write cycles of the state file
const LOCK_FILE: &str = "state.lock";

/// Per-namespace pass locks inside the state directory
const LOCKS_DIR: &str = "locks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BerthState {
    /// Last time the state was updated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Latest pass per namespace
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceState {
    /// Spec file or directory the pass was run from
    pub source: String,

    /// Fingerprint of the desired state the pass converged towards
    pub fingerprint: String,

    pub report: PassReport,
}

impl BerthState {
    pub fn state_file(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    pub fn audit_file(dir: &Path) -> PathBuf {
        dir.join(AUDIT_FILE)
    }

    pub fn locks_dir(dir: &Path) -> PathBuf {
        dir.join(LOCKS_DIR)
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::state_file(dir);

        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let path = Self::state_file(dir);
        let content = toml::to_string_pretty(self).context("Failed to serialize state to TOML")?;

        fs::write(&path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Merge `recorded` into the state on disk and return the result
    ///
    /// The file is re-read under the lock; for each namespace the newer
    /// pass wins.
    pub fn merge_into(dir: &Path, recorded: &Self) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

        let mut state = Self::load(dir)?;
        state.absorb(recorded);
        state.save(dir)?;
        Ok(state)
    }

    fn absorb(&mut self, other: &Self) {
        for (name, incoming) in &other.namespaces {
            let newer = self
                .namespaces
                .get(name)
                .is_none_or(|current| current.report.finished_at <= incoming.report.finished_at);
            if newer {
                self.namespaces.insert(name.clone(), incoming.clone());
            }
        }
        self.last_updated = self.last_updated.max(other.last_updated);
    }

    /// Record a finished pass, replacing the previous one for its namespace
    pub fn record(&mut self, report: PassReport, source: &str, fingerprint: &str) {
        self.last_updated = Some(Utc::now());
        self.namespaces.insert(
            report.namespace.clone(),
            NamespaceState {
                source: source.to_string(),
                fingerprint: fingerprint.to_string(),
                report,
            },
        );
    }

    /// Highest pass id recorded so far
    pub fn last_pass_id(&self) -> u64 {
        self.namespaces
            .values()
            .map(|ns| ns.report.pass_id)
            .max()
            .unwrap_or(0)
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceState> {
        self.namespaces.get(name)
    }
}
