//! Diff engine - turns desired vs observed state into ordered actions

use crate::types::{Action, ActionKind, ApplicationSpec, ObservedState, Target};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Compute the actions that bring one service from `observed` to `desired`
///
/// Either side may be absent: no observed state yields a single Create,
/// no desired spec yields a single Delete. When both exist the image is
/// compared before the replica count, so an UpdateImage always precedes
/// a Scale for the same service.
pub fn diff(desired: Option<&ApplicationSpec>, observed: Option<&ObservedState>) -> Vec<Action> {
    match (desired, observed) {
        (None, None) => Vec::new(),
        (Some(spec), None) => vec![Action::new(
            ActionKind::Create,
            spec.target(),
            Some(spec.clone()),
            "service not found in cluster",
        )],
        (None, Some(obs)) => vec![Action::new(
            ActionKind::Delete,
            Target::new(&obs.name, &obs.namespace),
            None,
            "service not declared in spec",
        )],
        (Some(spec), Some(obs)) => {
            let mut actions = Vec::new();

            if spec.image != obs.image {
                actions.push(Action::new(
                    ActionKind::UpdateImage {
                        image: spec.image.clone(),
                    },
                    spec.target(),
                    Some(spec.clone()),
                    format!("image {} differs from desired {}", obs.image, spec.image),
                ));
            }

            if spec.replicas != obs.replicas {
                actions.push(Action::new(
                    ActionKind::Scale {
                        delta: i64::from(spec.replicas) - i64::from(obs.replicas),
                        replicas: spec.replicas,
                    },
                    spec.target(),
                    Some(spec.clone()),
                    format!(
                        "{} replica(s) declared in cluster, {} desired",
                        obs.replicas, spec.replicas
                    ),
                ));
            }

            actions
        }
    }
}

/// Compute the ordered action list for a whole namespace
///
/// Desired specs are matched to observed services by name. Observed
/// services without a spec are deleted only when `prune` is set. The
/// result is stably sorted by action rank (Create, UpdateImage, Scale,
/// Delete); within a rank, desired input order is kept and orphan deletes
/// follow in observed order.
pub fn diff_namespace(
    desired: &[ApplicationSpec],
    observed: &[ObservedState],
    prune: bool,
) -> Vec<Action> {
    let by_name: HashMap<&str, &ObservedState> =
        observed.iter().map(|o| (o.name.as_str(), o)).collect();

    let mut actions: Vec<Action> = desired
        .iter()
        .flat_map(|spec| diff(Some(spec), by_name.get(spec.name.as_str()).copied()))
        .collect();

    if prune {
        actions.extend(
            observed
                .iter()
                .filter(|obs| !desired.iter().any(|spec| spec.name == obs.name))
                .flat_map(|obs| diff(None, Some(obs))),
        );
    }

    // stable sort: input order survives within a rank
    actions.sort_by_key(|a| a.kind.rank());
    actions
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub creates: usize,
    pub image_updates: usize,
    pub scales: usize,
    pub deletes: usize,
}

impl DiffSummary {
    /// Create a summary from a list of actions
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut summary = Self::default();
        for action in actions {
            match action.kind {
                ActionKind::Create => summary.creates += 1,
                ActionKind::UpdateImage { .. } => summary.image_updates += 1,
                ActionKind::Scale { .. } => summary.scales += 1,
                ActionKind::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.image_updates + self.scales + self.deletes
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceLimits;

    fn spec(name: &str, image: &str, replicas: u32) -> ApplicationSpec {
        ApplicationSpec {
            name: name.to_string(),
            namespace: "prod".to_string(),
            image: image.to_string(),
            replicas,
            port: 8080,
            health_check_path: "/health".to_string(),
            limits: ResourceLimits::default(),
        }
    }

    fn observed(name: &str, image: &str, replicas: u32) -> ObservedState {
        ObservedState {
            name: name.to_string(),
            namespace: "prod".to_string(),
            replicas,
            ready_replicas: replicas,
            pod_phases: Vec::new(),
            image: image.to_string(),
        }
    }

    /// Apply actions to an observed snapshot the way a well-behaved cluster would
    fn simulate(observed: &[ObservedState], actions: &[Action]) -> Vec<ObservedState> {
        let mut state = observed.to_vec();
        for action in actions {
            let pos = state.iter().position(|o| o.name == action.target.name);
            match (&action.kind, pos) {
                (ActionKind::Create, None) => {
                    state.push(ObservedState::from_spec(action.spec.as_ref().unwrap()));
                }
                (ActionKind::UpdateImage { image }, Some(i)) => state[i].image = image.clone(),
                (ActionKind::Scale { replicas, .. }, Some(i)) => state[i].replicas = *replicas,
                (ActionKind::Delete, Some(i)) => {
                    state.remove(i);
                }
                (kind, pos) => panic!("unexpected {kind:?} at {pos:?}"),
            }
        }
        state
    }

    #[test]
    fn test_absent_observed_yields_single_create() {
        for (image, replicas) in [("web:1", 0), ("web:2", 3), ("other:9", 10)] {
            let desired = spec("web", image, replicas);
            let actions = diff(Some(&desired), None);
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].kind, ActionKind::Create);
            assert_eq!(actions[0].spec.as_ref(), Some(&desired));
        }
    }

    #[test]
    fn test_image_only_difference() {
        let actions = diff(Some(&spec("web", "web:2", 2)), Some(&observed("web", "web:1", 2)));
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::UpdateImage {
                image: "web:2".into()
            }
        );
    }

    #[test]
    fn test_replica_difference_delta() {
        let actions = diff(Some(&spec("web", "web:1", 1)), Some(&observed("web", "web:1", 4)));
        assert_eq!(
            actions,
            vec![Action::new(
                ActionKind::Scale {
                    delta: -3,
                    replicas: 1
                },
                spec("web", "web:1", 1).target(),
                Some(spec("web", "web:1", 1)),
                "4 replica(s) declared in cluster, 1 desired",
            )]
        );
    }

    #[test]
    fn test_image_before_scale() {
        let actions = diff(Some(&spec("web", "web:2", 5)), Some(&observed("web", "web:1", 2)));
        let verbs: Vec<_> = actions.iter().map(|a| a.kind.verb()).collect();
        assert_eq!(verbs, vec!["update-image", "scale"]);
    }

    #[test]
    fn test_in_sync_yields_nothing() {
        let desired = spec("web", "web:1", 2);
        assert!(diff(Some(&desired), Some(&observed("web", "web:1", 2))).is_empty());
        assert!(diff(None, None).is_empty());
    }

    #[test]
    fn test_desired_absent_yields_delete() {
        let actions = diff(None, Some(&observed("old", "old:1", 1)));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Delete);
        assert!(actions[0].spec.is_none());
    }

    #[test]
    fn test_namespace_ordering_by_rank_then_input() {
        let desired = vec![
            spec("a", "a:2", 3), // update + scale
            spec("b", "b:1", 1), // create
            spec("c", "c:1", 2), // scale
            spec("d", "d:1", 1), // create
        ];
        let observed = vec![
            observed("zombie", "z:1", 1),
            observed("c", "c:1", 1),
            observed("a", "a:1", 1),
        ];
        let actions = diff_namespace(&desired, &observed, true);
        let plan: Vec<_> = actions
            .iter()
            .map(|a| format!("{}:{}", a.kind.verb(), a.target.name))
            .collect();
        assert_eq!(
            plan,
            vec![
                "create:b",
                "create:d",
                "update-image:a",
                "scale:a",
                "scale:c",
                "delete:zombie",
            ]
        );
    }

    #[test]
    fn test_namespace_without_prune_keeps_orphans() {
        let actions = diff_namespace(&[], &[observed("zombie", "z:1", 1)], false);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_idempotent_after_apply() {
        let desired = vec![spec("a", "a:2", 3), spec("b", "b:1", 0), spec("c", "c:1", 2)];
        let before = vec![
            observed("a", "a:1", 1),
            observed("c", "c:1", 5),
            observed("gone", "g:1", 1),
        ];

        let actions = diff_namespace(&desired, &before, true);
        assert!(!actions.is_empty());

        let after = simulate(&before, &actions);
        assert!(diff_namespace(&desired, &after, true).is_empty());
    }

    #[test]
    fn test_diff_summary() {
        let desired = vec![spec("a", "a:2", 3), spec("b", "b:1", 1)];
        let observed = vec![observed("a", "a:1", 1), observed("x", "x:1", 1)];
        let summary = DiffSummary::from_actions(&diff_namespace(&desired, &observed, true));
        assert_eq!(
            summary,
            DiffSummary {
                creates: 1,
                image_updates: 1,
                scales: 1,
                deletes: 1,
            }
        );
        assert!(summary.has_changes());
        assert_eq!(summary.total(), 4);
    }
}
