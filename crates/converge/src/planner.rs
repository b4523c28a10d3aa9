//! Pass planner - splits desired state into per-namespace passes

use crate::types::ApplicationSpec;

/// Desired state of one namespace, reconciled by a single pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePlan {
    pub namespace: String,
    pub specs: Vec<ApplicationSpec>,
}

/// Group specs by namespace
///
/// Namespaces appear in order of first appearance; specs keep their input
/// order within a namespace.
pub fn group_by_namespace(specs: &[ApplicationSpec]) -> Vec<NamespacePlan> {
    let mut plans: Vec<NamespacePlan> = Vec::new();
    for spec in specs {
        match plans.iter_mut().find(|p| p.namespace == spec.namespace) {
            Some(plan) => plan.specs.push(spec.clone()),
            None => plans.push(NamespacePlan {
                namespace: spec.namespace.clone(),
                specs: vec![spec.clone()],
            }),
        }
    }
    plans
}

/// Keep only specs matching a target pattern
///
/// Target format: "namespace" or "namespace/name".
pub fn filter_by_target(specs: Vec<ApplicationSpec>, target: Option<&str>) -> Vec<ApplicationSpec> {
    match target {
        None => specs,
        Some(t) => {
            let (namespace, name) = parse_target(t);
            specs
                .into_iter()
                .filter(|s| matches_filter(s, &namespace, name.as_deref()))
                .collect()
        }
    }
}

/// Parse a target string like "namespace/name" into (namespace, name)
fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('/') {
        Some((namespace, name)) => (namespace.to_string(), Some(name.to_string())),
        None => (target.to_string(), None),
    }
}

/// Check if a spec matches the filter criteria
fn matches_filter(spec: &ApplicationSpec, namespace: &str, name: Option<&str>) -> bool {
    if spec.namespace != namespace {
        return false;
    }
    if let Some(n) = name
        && spec.name != n
    {
        return false;
    }
    true
}
