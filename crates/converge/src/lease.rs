//! Per-namespace leases
//!
//! A namespace may be mutated by at most one pass at a time. Passes over
//! different namespaces never contend. A [`NamespaceLease`] is held for
//! the duration of a pass and released when dropped, on every exit path.
//!
//! Leases alone only serialize passes inside one process. A registry built
//! with [`LeaseRegistry::with_lock_dir`] also takes an exclusive file lock
//! per namespace, which serializes passes across processes sharing that
//! directory.

use crate::error::Result;
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Leases {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl Leases {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of namespace leases; clones share the same registry
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    inner: Arc<Leases>,
    lock_dir: Option<PathBuf>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose passes also hold `<dir>/<namespace>.lock`
    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::default(),
            lock_dir: Some(dir.into()),
        }
    }

    pub fn lock_dir(&self) -> Option<&Path> {
        self.lock_dir.as_deref()
    }

    /// Acquire the lease and, with a lock directory, the namespace file lock
    ///
    /// Blocks until both are free. The file lock is released together with
    /// the lease.
    pub fn acquire_locked(&self, namespace: &str) -> Result<NamespaceLease> {
        let mut lease = self.acquire(namespace);
        if let Some(dir) = &self.lock_dir {
            lease.file = Some(lock_file(dir, namespace)?);
        }
        Ok(lease)
    }

    /// Acquire the lease for `namespace`, blocking while another pass holds it
    pub fn acquire(&self, namespace: &str) -> NamespaceLease {
        let mut held = self.inner.lock();
        while held.contains(namespace) {
            log::debug!("Waiting for lease on namespace {namespace}");
            held = self
                .inner
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(namespace.to_string());
        log::debug!("Acquired lease on namespace {namespace}");
        self.lease(namespace)
    }

    /// Acquire the lease, giving up after `timeout`
    pub fn acquire_timeout(&self, namespace: &str, timeout: Duration) -> Option<NamespaceLease> {
        let held = self.inner.lock();
        let (mut held, result) = self
            .inner
            .released
            .wait_timeout_while(held, timeout, |held| held.contains(namespace))
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && held.contains(namespace) {
            return None;
        }
        held.insert(namespace.to_string());
        log::debug!("Acquired lease on namespace {namespace}");
        Some(self.lease(namespace))
    }

    /// Acquire the lease only if it is free right now
    pub fn try_acquire(&self, namespace: &str) -> Option<NamespaceLease> {
        let mut held = self.inner.lock();
        if !held.insert(namespace.to_string()) {
            return None;
        }
        Some(self.lease(namespace))
    }

    /// Check whether a pass currently holds the namespace
    pub fn is_held(&self, namespace: &str) -> bool {
        self.inner.lock().contains(namespace)
    }

    fn lease(&self, namespace: &str) -> NamespaceLease {
        NamespaceLease {
            namespace: namespace.to_string(),
            leases: Arc::clone(&self.inner),
            file: None,
        }
    }
}

fn lock_file(dir: &Path, namespace: &str) -> Result<File> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{namespace}.lock"));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;
    if file.try_lock_exclusive().is_err() {
        log::info!(
            "Namespace {namespace} is locked by another process, waiting on {}",
            path.display()
        );
        file.lock_exclusive()?;
    }
    log::debug!("Locked {}", path.display());
    Ok(file)
}

/// Exclusive right to mutate one namespace; released on drop
#[derive(Debug)]
pub struct NamespaceLease {
    namespace: String,
    leases: Arc<Leases>,
    file: Option<File>,
}

impl NamespaceLease {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for NamespaceLease {
    fn drop(&mut self) {
        // closing the file releases the process-wide lock
        drop(self.file.take());
        self.leases.lock().remove(&self.namespace);
        self.leases.released.notify_all();
        log::debug!("Released lease on namespace {}", self.namespace);
    }
}
