//! In-memory cluster for tests and embedding
//!
//! [`InMemoryCluster`] behaves like a well-behaved cluster: creates make a
//! service appear with the spec's image and replica count, scales and image
//! updates mutate it, deletes remove it. Failures can be scripted per
//! operation and every call is recorded, so tests can assert on ordering
//! and attempt counts.

use crate::client::{ClusterClient, ClusterResult};
use crate::error::ClusterError;
use crate::types::{ApplicationSpec, ObservedState, PodPhase};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Cluster operation, used for failure scripting and call records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Observe,
    Create,
    Scale,
    UpdateImage,
    Delete,
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub namespace: String,
    /// Service name; empty for namespace-wide observation
    pub name: String,
}

#[derive(Debug, Default)]
struct Inner {
    // namespace -> services in creation order
    services: HashMap<String, Vec<ObservedState>>,
    failures: HashMap<Operation, VecDeque<ClusterError>>,
    // checked before the namespace-independent queue
    scoped_failures: HashMap<(Operation, String), VecDeque<ClusterError>>,
    calls: Vec<Call>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Thread-safe fake cluster
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<Mutex<Inner>>,
    latency: Duration,
}

impl InMemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take at least `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a service as if it were already running
    pub fn insert(&self, observed: ObservedState) {
        let mut inner = self.lock();
        let services = inner.services.entry(observed.namespace.clone()).or_default();
        services.retain(|s| s.name != observed.name);
        services.push(observed);
    }

    /// Queue errors returned by the next calls of `op`, in order
    pub fn fail_next(&self, op: Operation, errors: impl IntoIterator<Item = ClusterError>) {
        self.lock().failures.entry(op).or_default().extend(errors);
    }

    /// Queue errors returned by the next calls of `op` in `namespace` only
    pub fn fail_next_in(
        &self,
        namespace: &str,
        op: Operation,
        errors: impl IntoIterator<Item = ClusterError>,
    ) {
        self.lock()
            .scoped_failures
            .entry((op, namespace.to_string()))
            .or_default()
            .extend(errors);
    }

    /// Current services of a namespace
    pub fn services(&self, namespace: &str) -> Vec<ObservedState> {
        self.lock()
            .services
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls made for one operation
    pub fn call_count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Highest number of overlapping calls seen for a namespace
    pub fn max_in_flight(&self, namespace: &str) -> usize {
        self.lock()
            .max_in_flight
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    /// Record the call, wait out the latency, then run `f` unless a
    /// scripted failure is pending for `op`
    fn call<T>(
        &self,
        op: Operation,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut Inner) -> ClusterResult<T>,
    ) -> ClusterResult<T> {
        {
            let mut inner = self.lock();
            inner.calls.push(Call {
                op,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            let current = {
                let count = inner.in_flight.entry(namespace.to_string()).or_default();
                *count += 1;
                *count
            };
            let max = inner.max_in_flight.entry(namespace.to_string()).or_default();
            *max = (*max).max(current);
        }

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut inner = self.lock();
        if let Some(count) = inner.in_flight.get_mut(namespace) {
            *count = count.saturating_sub(1);
        }
        let scoped = inner
            .scoped_failures
            .get_mut(&(op, namespace.to_string()))
            .and_then(VecDeque::pop_front);
        if let Some(err) = scoped.or_else(|| inner.failures.get_mut(&op)?.pop_front()) {
            return Err(err);
        }
        f(&mut *inner)
    }
}

fn find_mut<'a>(
    inner: &'a mut Inner,
    name: &str,
    namespace: &str,
) -> ClusterResult<&'a mut ObservedState> {
    inner
        .services
        .get_mut(namespace)
        .and_then(|services| services.iter_mut().find(|s| s.name == name))
        .ok_or_else(|| ClusterError::permanent(format!("service {namespace}/{name} not found")))
}

fn running(replicas: u32) -> Vec<PodPhase> {
    vec![PodPhase::Running; replicas as usize]
}

impl ClusterClient for InMemoryCluster {
    fn get_observed_state(&self, namespace: &str) -> ClusterResult<Vec<ObservedState>> {
        self.call(Operation::Observe, namespace, "", |inner| {
            Ok(inner.services.get(namespace).cloned().unwrap_or_default())
        })
    }

    fn create_service(&self, spec: &ApplicationSpec) -> ClusterResult<()> {
        self.call(Operation::Create, &spec.namespace, &spec.name, |inner| {
            let services = inner.services.entry(spec.namespace.clone()).or_default();
            if services.iter().any(|s| s.name == spec.name) {
                return Err(ClusterError::permanent(format!(
                    "service {} already exists",
                    spec.target()
                )));
            }
            let mut observed = ObservedState::from_spec(spec);
            observed.ready_replicas = spec.replicas;
            observed.pod_phases = running(spec.replicas);
            services.push(observed);
            Ok(())
        })
    }

    fn scale_service(&self, name: &str, namespace: &str, replicas: u32) -> ClusterResult<()> {
        self.call(Operation::Scale, namespace, name, |inner| {
            let service = find_mut(inner, name, namespace)?;
            service.replicas = replicas;
            service.ready_replicas = replicas;
            service.pod_phases = running(replicas);
            Ok(())
        })
    }

    fn update_image(&self, name: &str, namespace: &str, image: &str) -> ClusterResult<()> {
        self.call(Operation::UpdateImage, namespace, name, |inner| {
            find_mut(inner, name, namespace)?.image = image.to_string();
            Ok(())
        })
    }

    fn delete_service(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        self.call(Operation::Delete, namespace, name, |inner| {
            let not_found =
                || ClusterError::permanent(format!("service {namespace}/{name} not found"));
            let services = inner.services.get_mut(namespace).ok_or_else(not_found)?;
            let index = services
                .iter()
                .position(|svc| svc.name == name)
                .ok_or_else(not_found)?;
            services.remove(index);
            Ok(())
        })
    }
}
