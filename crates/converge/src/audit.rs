//! Append-only audit log of reconciliation results
//!
//! Passes over different namespaces append concurrently. An in-memory log
//! keeps every entry; a file-backed log writes JSON lines and keeps nothing
//! in memory unless asked to, so it stays bounded in long-lived processes.

use crate::error::Result;
use crate::types::ReconciliationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub namespace: String,
    pub pass_id: u64,
    pub recorded_at: DateTime<Utc>,
    pub result: ReconciliationResult,
}

#[derive(Debug)]
struct Inner {
    entries: Vec<AuditEntry>,
    sink: Option<File>,
    retain: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            sink: None,
            retain: true,
        }
    }
}

/// Append-only audit log; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    inner: Arc<Mutex<Inner>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// In-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that appends JSON lines to `path`
    ///
    /// Entries are not kept in memory; read them back with [`read_entries`]
    /// or opt in with [`Self::retain_in_memory`].
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                sink: Some(file),
                retain: false,
            })),
            path: Some(path.to_path_buf()),
        })
    }

    /// Also keep appended entries in memory
    pub fn retain_in_memory(self, retain: bool) -> Self {
        self.lock().retain = retain;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// File the log is persisted to, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a result
    ///
    /// A failing file sink is logged; the entry is then kept in memory
    /// whatever the retention setting.
    pub fn append(&self, namespace: &str, pass_id: u64, result: ReconciliationResult) {
        let entry = AuditEntry {
            namespace: namespace.to_string(),
            pass_id,
            recorded_at: Utc::now(),
            result,
        };

        let mut inner = self.lock();
        let mut keep = inner.retain;
        if let Some(sink) = inner.sink.as_mut()
            && let Err(e) = write_line(sink, &entry)
        {
            log::warn!("Failed to write audit entry: {e}");
            keep = true;
        }
        if keep {
            inner.entries.push(entry);
        }
    }

    /// Entries held in memory, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().entries.clone()
    }

    /// Entries for one namespace, oldest first
    pub fn entries_for(&self, namespace: &str) -> Vec<AuditEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.namespace == namespace)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_line(sink: &mut File, entry: &AuditEntry) -> Result<()> {
    let line = serde_json::to_string(entry)?;
    writeln!(sink, "{line}")?;
    Ok(())
}

/// Read entries back from a JSON-lines audit file
///
/// A missing file yields an empty list.
pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ActionKind, ActionState, Target};
    use std::thread;
    use tempfile::TempDir;

    fn result(name: &str) -> ReconciliationResult {
        ReconciliationResult {
            action: Action::new(ActionKind::Create, Target::new(name, "ns"), None, "test"),
            state: ActionState::Succeeded,
            success: true,
            attempts: 1,
            error: None,
            error_kind: None,
        }
    }

    #[test]
    fn test_append_and_filter() {
        let log = AuditLog::new();
        log.append("a", 1, result("web"));
        log.append("b", 2, result("api"));
        log.append("a", 3, result("db"));

        assert_eq!(log.len(), 3);
        let a: Vec<_> = log.entries_for("a").iter().map(|e| e.pass_id).collect();
        assert_eq!(a, vec![1, 3]);
    }

    #[test]
    fn test_concurrent_appends() {
        let log = AuditLog::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        log.append(&format!("ns{i}"), i, result("web"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 200);
        assert_eq!(log.entries_for("ns3").len(), 25);
    }

    #[test]
    fn test_file_sink_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("audit.jsonl");

        let log = AuditLog::with_file(&path).unwrap();
        log.append("a", 7, result("web"));
        log.append("a", 7, result("api"));
        drop(log);

        let reopened = AuditLog::with_file(&path).unwrap();
        reopened.append("b", 8, result("db"));

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].namespace, "b");
        assert_eq!(entries[0].result.action.target.name, "web");
    }

    #[test]
    fn test_file_log_does_not_grow_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = AuditLog::with_file(&path).unwrap();
        for pass_id in 0..50 {
            log.append("a", pass_id, result("web"));
        }
        assert!(log.is_empty());
        assert_eq!(read_entries(&path).unwrap().len(), 50);

        let retained = AuditLog::with_file(&path).unwrap().retain_in_memory(true);
        retained.append("a", 50, result("web"));
        assert_eq!(retained.len(), 1);
        assert_eq!(read_entries(&path).unwrap().len(), 51);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_entries(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
