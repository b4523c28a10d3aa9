//! Cluster client capability set
//!
//! The reconciler never talks to a cluster directly. Everything goes
//! through [`ClusterClient`], which lets the same pass logic drive a real
//! cluster (see the `kubekit` crate) or the in-memory fake in
//! [`crate::memory`].

use crate::error::ClusterError;
use crate::types::{ApplicationSpec, ObservedState};

/// Result of a cluster client call.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Operations a reconciler needs from a cluster
///
/// Every call may fail with a transient or permanent [`ClusterError`];
/// the executor decides whether to retry based on that kind.
pub trait ClusterClient: Send + Sync {
    /// Fetch the current state of every managed service in a namespace
    fn get_observed_state(&self, namespace: &str) -> ClusterResult<Vec<ObservedState>>;

    /// Create a service from its spec
    fn create_service(&self, spec: &ApplicationSpec) -> ClusterResult<()>;

    /// Set the replica count of an existing service
    fn scale_service(&self, name: &str, namespace: &str, replicas: u32) -> ClusterResult<()>;

    /// Roll an existing service to a new image reference
    fn update_image(&self, name: &str, namespace: &str, image: &str) -> ClusterResult<()>;

    /// Remove a service
    fn delete_service(&self, name: &str, namespace: &str) -> ClusterResult<()>;
}

impl<C: ClusterClient + ?Sized> ClusterClient for &C {
    fn get_observed_state(&self, namespace: &str) -> ClusterResult<Vec<ObservedState>> {
        (**self).get_observed_state(namespace)
    }

    fn create_service(&self, spec: &ApplicationSpec) -> ClusterResult<()> {
        (**self).create_service(spec)
    }

    fn scale_service(&self, name: &str, namespace: &str, replicas: u32) -> ClusterResult<()> {
        (**self).scale_service(name, namespace, replicas)
    }

    fn update_image(&self, name: &str, namespace: &str, image: &str) -> ClusterResult<()> {
        (**self).update_image(name, namespace, image)
    }

    fn delete_service(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        (**self).delete_service(name, namespace)
    }
}

impl<C: ClusterClient + ?Sized> ClusterClient for Box<C> {
    fn get_observed_state(&self, namespace: &str) -> ClusterResult<Vec<ObservedState>> {
        (**self).get_observed_state(namespace)
    }

    fn create_service(&self, spec: &ApplicationSpec) -> ClusterResult<()> {
        (**self).create_service(spec)
    }

    fn scale_service(&self, name: &str, namespace: &str, replicas: u32) -> ClusterResult<()> {
        (**self).scale_service(name, namespace, replicas)
    }

    fn update_image(&self, name: &str, namespace: &str, image: &str) -> ClusterResult<()> {
        (**self).update_image(name, namespace, image)
    }

    fn delete_service(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        (**self).delete_service(name, namespace)
    }
}
