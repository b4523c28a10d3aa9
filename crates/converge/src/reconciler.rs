//! Reconciler - runs passes per namespace and answers status queries

use crate::audit::AuditLog;
use crate::cancel::{CancelToken, PassDeadline};
use crate::client::ClusterClient;
use crate::context::{ProgressCallback, ReconcileOptions};
use crate::diff::diff_namespace;
use crate::error::{Error, Result};
use crate::executor::{call_with_retry, execute_actions};
use crate::lease::LeaseRegistry;
use crate::planner::group_by_namespace;
use crate::retry::LogCallback;
use crate::types::{Action, ApplicationSpec, PassReport, ReconciliationResult};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Drives reconciliation passes against a cluster
///
/// Passes over the same namespace are serialized through a
/// [`LeaseRegistry`]; passes over different namespaces run concurrently.
/// Observed state is fetched at the start of every pass and never cached.
pub struct Reconciler<C: ClusterClient> {
    client: C,
    options: ReconcileOptions,
    leases: LeaseRegistry,
    audit: AuditLog,
    cancel: CancelToken,
    latest: Mutex<HashMap<String, PassReport>>,
    next_pass_id: AtomicU64,
}

impl<C: ClusterClient> Reconciler<C> {
    pub fn new(client: C, options: ReconcileOptions) -> Self {
        Self {
            client,
            options,
            leases: LeaseRegistry::new(),
            audit: AuditLog::new(),
            cancel: CancelToken::new(),
            latest: Mutex::new(HashMap::new()),
            next_pass_id: AtomicU64::new(1),
        }
    }

    /// Record results in the given audit log instead of a private one
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Share leases with other reconcilers driving the same cluster
    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    /// Use an externally controlled cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number pass ids from `first` onwards
    pub fn with_first_pass_id(self, first: u64) -> Self {
        self.next_pass_id.store(first, Ordering::SeqCst);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn latest(&self) -> MutexGuard<'_, HashMap<String, PassReport>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self) -> PassDeadline {
        PassDeadline::new(self.options.pass_timeout, self.cancel.clone())
    }

    /// Fetch observed state, retrying transient failures, and diff it
    fn observe_and_diff(
        &self,
        namespace: &str,
        desired: &[ApplicationSpec],
        deadline: &PassDeadline,
    ) -> Result<Vec<Action>> {
        let (observed, attempts) = call_with_retry(
            &format!("observe namespace {namespace}"),
            &self.options.retry,
            deadline,
            || self.client.get_observed_state(namespace),
        );
        let observed = observed.map_err(|source| Error::Observe {
            namespace: namespace.to_string(),
            source,
        })?;
        log::debug!(
            "Observed {} service(s) in namespace {namespace} after {attempts} attempt(s)",
            observed.len()
        );
        Ok(diff_namespace(desired, &observed, self.options.prune))
    }

    /// Compute the actions a pass would take, without mutating anything
    pub fn plan(&self, namespace: &str, desired: &[ApplicationSpec]) -> Result<Vec<Action>> {
        self.observe_and_diff(namespace, desired, &self.deadline())
    }

    /// Plan every namespace named in `specs`, in first-appearance order
    ///
    /// Each namespace is planned independently; one that cannot be observed
    /// carries its error and the others are still planned.
    pub fn plan_all(&self, specs: &[ApplicationSpec]) -> Vec<(String, Result<Vec<Action>>)> {
        group_by_namespace(specs)
            .into_iter()
            .map(|plan| {
                let actions = self.plan(&plan.namespace, &plan.specs);
                (plan.namespace, actions)
            })
            .collect()
    }

    /// Run one reconciliation pass over a namespace
    ///
    /// Blocks while another pass holds the namespace. The lease is held
    /// until the pass report is stored. When observed state cannot be
    /// fetched the pass is recorded as failed, so [`Self::get_status`]
    /// never falls back to an older pass, and the error is returned.
    pub fn reconcile_namespace(
        &self,
        namespace: &str,
        desired: &[ApplicationSpec],
        progress: &dyn ProgressCallback,
    ) -> Result<PassReport> {
        let _lease = self.leases.acquire_locked(namespace)?;
        let pass_id = self.next_pass_id.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        let deadline = self.deadline();
        log::debug!("Pass {pass_id} started for namespace {namespace}");

        let actions = match self.observe_and_diff(namespace, desired, &deadline) {
            Ok(actions) => actions,
            Err(err) => {
                log::warn!("Pass {pass_id} for namespace {namespace} failed: {err}");
                let report = PassReport::failed(namespace, pass_id, started_at, err.to_string());
                self.latest().insert(namespace.to_string(), report.clone());
                progress.on_pass_complete(&report);
                return Err(err);
            }
        };
        progress.on_pass_start(namespace, actions.len());

        let results = execute_actions(
            &self.client,
            namespace,
            actions,
            &self.options.retry,
            &deadline,
            progress,
            &LogCallback,
        );

        for result in &results {
            self.audit.append(namespace, pass_id, result.clone());
        }

        let timed_out =
            deadline.timed_out() && results.iter().any(ReconciliationResult::is_not_started);
        let report = PassReport {
            namespace: namespace.to_string(),
            pass_id,
            started_at,
            finished_at: Utc::now(),
            timed_out,
            error: None,
            results,
        };
        log::debug!(
            "Pass {pass_id} finished for namespace {namespace}: {:?}",
            report.summary()
        );

        self.latest().insert(namespace.to_string(), report.clone());
        progress.on_pass_complete(&report);
        Ok(report)
    }

    /// Reconcile every namespace named in `specs`
    ///
    /// Namespaces run concurrently on up to `jobs` threads. One result per
    /// namespace is returned, in first-appearance order; a namespace whose
    /// state cannot be observed does not stop the others.
    pub fn reconcile_all(
        &self,
        specs: &[ApplicationSpec],
        progress: &dyn ProgressCallback,
    ) -> Result<Vec<Result<PassReport>>> {
        let plans = group_by_namespace(specs);
        if plans.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create thread pool: {e}")))?;

        Ok(pool.install(|| {
            plans
                .par_iter()
                .map(|plan| self.reconcile_namespace(&plan.namespace, &plan.specs, progress))
                .collect()
        }))
    }

    /// Results of the most recent pass over a namespace
    pub fn get_status(&self, namespace: &str) -> Vec<ReconciliationResult> {
        self.latest()
            .get(namespace)
            .map(|r| r.results.clone())
            .unwrap_or_default()
    }

    /// Full report of the most recent pass over a namespace
    pub fn latest_report(&self, namespace: &str) -> Option<PassReport> {
        self.latest().get(namespace).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::error::ClusterError;
    use crate::memory::{InMemoryCluster, Operation};
    use crate::retry::RetryConfig;
    use crate::types::{ActionKind, ActionState, ObservedState, ResourceLimits};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn spec(namespace: &str, name: &str, image: &str, replicas: u32) -> ApplicationSpec {
        ApplicationSpec {
            name: name.to_string(),
            namespace: namespace.to_string(),
            image: image.to_string(),
            replicas,
            port: 5000,
            health_check_path: "/health".to_string(),
            limits: ResourceLimits::default(),
        }
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            retry: RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 2.0,
                max_delay: Duration::from_millis(5),
            },
            prune: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_pass_converges_and_is_idempotent() {
        let cluster = InMemoryCluster::new();
        cluster.insert(ObservedState {
            name: "web".into(),
            namespace: "flask".into(),
            replicas: 1,
            ready_replicas: 1,
            pod_phases: Vec::new(),
            image: "flask-app:1".into(),
        });
        cluster.insert(ObservedState::from_spec(&spec("flask", "old", "old:1", 1)));

        let desired = vec![
            spec("flask", "web", "flask-app:2", 3),
            spec("flask", "worker", "flask-app:2", 1),
        ];
        let reconciler = Reconciler::new(cluster.clone(), options());

        let report = reconciler
            .reconcile_namespace("flask", &desired, &NoProgress)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.results.len(), 4);

        let verbs: Vec<_> = report
            .results
            .iter()
            .map(|r| r.action.kind.verb())
            .collect();
        assert_eq!(verbs, vec!["create", "update-image", "scale", "delete"]);

        assert!(reconciler.plan("flask", &desired).unwrap().is_empty());
        let second = reconciler
            .reconcile_namespace("flask", &desired, &NoProgress)
            .unwrap();
        assert!(second.results.is_empty());
        assert!(second.pass_id > report.pass_id);
    }

    #[test]
    fn test_create_issued_before_update_and_scale() {
        let cluster = InMemoryCluster::new();
        cluster.insert(ObservedState::from_spec(&spec("swim", "a", "a:1", 1)));
        let desired = vec![
            spec("swim", "a", "a:2", 4),
            spec("swim", "b", "b:1", 2),
        ];
        let reconciler = Reconciler::new(cluster.clone(), options());
        reconciler
            .reconcile_namespace("swim", &desired, &NoProgress)
            .unwrap();

        let ops: Vec<_> = cluster
            .calls()
            .into_iter()
            .filter(|c| c.op != Operation::Observe)
            .map(|c| c.op)
            .collect();
        assert_eq!(
            ops,
            vec![Operation::Create, Operation::UpdateImage, Operation::Scale]
        );
    }

    #[test]
    fn test_partial_failure_visible_without_rollback() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next(Operation::Create, [ClusterError::permanent("forbidden")]);
        let desired = vec![spec("swim", "a", "a:1", 1), spec("swim", "b", "b:1", 1)];
        let reconciler = Reconciler::new(cluster.clone(), options());

        let report = reconciler
            .reconcile_namespace("swim", &desired, &NoProgress)
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(report.results[0].state, ActionState::Failed);
        assert_eq!(report.results[1].state, ActionState::Succeeded);
        assert_eq!(cluster.services("swim").len(), 1);

        let status = reconciler.get_status("swim");
        assert_eq!(status, report.results);
        assert_eq!(reconciler.audit_log().entries_for("swim").len(), 2);
    }

    #[test]
    fn test_status_reflects_latest_pass_only() {
        let cluster = InMemoryCluster::new();
        let reconciler = Reconciler::new(cluster, options());
        let desired = vec![spec("swim", "a", "a:1", 1)];

        reconciler
            .reconcile_namespace("swim", &desired, &NoProgress)
            .unwrap();
        assert_eq!(reconciler.get_status("swim").len(), 1);

        reconciler
            .reconcile_namespace("swim", &desired, &NoProgress)
            .unwrap();
        assert!(reconciler.get_status("swim").is_empty());
        assert!(reconciler.get_status("unknown").is_empty());
        assert_eq!(reconciler.audit_log().len(), 1);
    }

    #[test]
    fn test_observe_failure_attempts_nothing() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next(Operation::Observe, [ClusterError::permanent("forbidden")]);
        let reconciler = Reconciler::new(cluster.clone(), options());

        let err = reconciler
            .reconcile_namespace("swim", &[spec("swim", "a", "a:1", 1)], &NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Observe { .. }));
        assert_eq!(cluster.calls().len(), 1);

        let report = reconciler.latest_report("swim").unwrap();
        assert!(report.error.unwrap().contains("forbidden"));
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_transient_observe_failures_are_retried() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next(
            Operation::Observe,
            [
                ClusterError::transient("connection refused"),
                ClusterError::transient("i/o timeout"),
            ],
        );
        let reconciler = Reconciler::new(cluster.clone(), options());

        let report = reconciler
            .reconcile_namespace("swim", &[spec("swim", "a", "a:1", 1)], &NoProgress)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(cluster.call_count(Operation::Observe), 3);
        assert_eq!(cluster.services("swim").len(), 1);
    }

    #[test]
    fn test_failed_observe_replaces_previous_status() {
        let cluster = InMemoryCluster::new();
        let reconciler = Reconciler::new(cluster.clone(), options());
        let desired = vec![spec("swim", "a", "a:1", 1)];

        let first = reconciler
            .reconcile_namespace("swim", &desired, &NoProgress)
            .unwrap();
        assert!(first.is_success());
        assert_eq!(reconciler.get_status("swim").len(), 1);

        cluster.fail_next(Operation::Observe, [ClusterError::permanent("forbidden")]);
        assert!(
            reconciler
                .reconcile_namespace("swim", &desired, &NoProgress)
                .is_err()
        );

        assert!(reconciler.get_status("swim").is_empty());
        let latest = reconciler.latest_report("swim").unwrap();
        assert!(latest.pass_id > first.pass_id);
        assert!(!latest.is_success());
    }

    #[test]
    fn test_plan_all_keeps_going_past_unobservable_namespace() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next(Operation::Observe, [ClusterError::permanent("forbidden")]);
        let reconciler = Reconciler::new(cluster, options());

        let plans = reconciler.plan_all(&[spec("web", "a", "a:1", 1), spec("swim", "b", "b:1", 1)]);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].0, "web");
        assert!(matches!(plans[0].1, Err(Error::Observe { .. })));
        assert_eq!(plans[1].0, "swim");
        assert_eq!(plans[1].1.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_all_runs_every_namespace() {
        let cluster = InMemoryCluster::new();
        let specs = vec![
            spec("flask", "web", "flask-app:1", 2),
            spec("swim", "app", "swimming-app:1", 1),
            spec("flask", "worker", "flask-app:1", 1),
        ];
        let reconciler = Reconciler::new(cluster.clone(), options());

        let reports: Vec<_> = reconciler
            .reconcile_all(&specs, &NoProgress)
            .unwrap()
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].namespace, "flask");
        assert_eq!(reports[0].results.len(), 2);
        assert_eq!(reports[1].namespace, "swim");
        assert_eq!(cluster.services("flask").len(), 2);
    }

    #[test]
    fn test_same_namespace_passes_never_overlap() {
        let cluster = InMemoryCluster::new().with_latency(Duration::from_millis(5));
        let reconciler = Arc::new(Reconciler::new(cluster.clone(), options()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let reconciler = Arc::clone(&reconciler);
                thread::spawn(move || {
                    let desired = vec![spec("swim", "app", &format!("app:{i}"), i + 1)];
                    reconciler
                        .reconcile_namespace("swim", &desired, &NoProgress)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_success());
        }

        assert_eq!(cluster.max_in_flight("swim"), 1);
    }

    #[test]
    fn test_different_namespaces_overlap() {
        let cluster = InMemoryCluster::new().with_latency(Duration::from_millis(20));
        let leases = LeaseRegistry::new();
        let reconciler = Reconciler::new(cluster, options()).with_leases(leases.clone());

        let _held = leases.acquire("flask");
        // a held flask lease must not block the swim pass
        let report = reconciler
            .reconcile_namespace("swim", &[spec("swim", "a", "a:1", 1)], &NoProgress)
            .unwrap();
        assert!(report.is_success());
    }

    #[test]
    fn test_timed_out_pass_marks_report() {
        let cluster = InMemoryCluster::new().with_latency(Duration::from_millis(20));
        let options = ReconcileOptions {
            pass_timeout: Some(Duration::from_millis(1)),
            ..options()
        };
        let reconciler = Reconciler::new(cluster.clone(), options);

        let report = reconciler
            .reconcile_namespace(
                "swim",
                &[spec("swim", "a", "a:1", 1), spec("swim", "b", "b:1", 1)],
                &NoProgress,
            )
            .unwrap();
        assert!(report.timed_out);
        assert!(report.results.iter().all(ReconciliationResult::is_not_started));
        assert_eq!(cluster.call_count(Operation::Create), 0);
    }

    #[test]
    fn test_prune_disabled_keeps_orphans() {
        let cluster = InMemoryCluster::new();
        cluster.insert(ObservedState::from_spec(&spec("swim", "old", "old:1", 1)));
        let options = ReconcileOptions {
            prune: false,
            ..options()
        };
        let reconciler = Reconciler::new(cluster, options);
        let actions = reconciler.plan("swim", &[]).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_plan_all_does_not_mutate() {
        let cluster = InMemoryCluster::new();
        let reconciler = Reconciler::new(cluster.clone(), options());
        let plans = reconciler.plan_all(&[spec("swim", "a", "a:1", 1)]);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].1.as_ref().unwrap()[0].kind, ActionKind::Create);
        assert!(cluster.services("swim").is_empty());
    }
}
