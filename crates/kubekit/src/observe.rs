//! Parse `kubectl get deployments,pods -o json` into observed state.

use crate::error::{Error, Result};
use crate::manifest::NAME_LABEL;
use converge::{ObservedState, PodPhase};

/// Build observed state from a kubectl `List` of Deployments and Pods
///
/// Pods are attributed to a service through the name label. Items of any
/// other kind are ignored.
pub fn parse_observed(namespace: &str, json: &serde_json::Value) -> Result<Vec<ObservedState>> {
    let items = json["items"]
        .as_array()
        .ok_or_else(|| Error::Other("kubectl output has no items list".to_string()))?;

    let mut services: Vec<ObservedState> = items
        .iter()
        .filter(|item| item["kind"] == "Deployment")
        .filter_map(|item| parse_deployment(namespace, item))
        .collect();

    for pod in items.iter().filter(|item| item["kind"] == "Pod") {
        let Some(owner) = pod["metadata"]["labels"][NAME_LABEL].as_str() else {
            continue;
        };
        let phase = PodPhase::parse(pod["status"]["phase"].as_str().unwrap_or_default());
        if let Some(service) = services.iter_mut().find(|s| s.name == owner) {
            service.pod_phases.push(phase);
        }
    }

    Ok(services)
}

fn parse_deployment(namespace: &str, item: &serde_json::Value) -> Option<ObservedState> {
    let name = item["metadata"]["name"].as_str()?;
    let containers = item["spec"]["template"]["spec"]["containers"].as_array();
    // the container named after the deployment, else the first one
    let image = containers
        .and_then(|cs| {
            cs.iter()
                .find(|c| c["name"] == name)
                .or_else(|| cs.first())
        })
        .and_then(|c| c["image"].as_str())
        .unwrap_or_default();

    Some(ObservedState {
        name: name.to_string(),
        namespace: item["metadata"]["namespace"]
            .as_str()
            .unwrap_or(namespace)
            .to_string(),
        replicas: count(&item["spec"]["replicas"]).unwrap_or(1),
        ready_replicas: count(&item["status"]["readyReplicas"]).unwrap_or(0),
        pod_phases: Vec::new(),
        image: image.to_string(),
    })
}

fn count(value: &serde_json::Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}
