//! Manifest rendering for managed services.
//!
//! Each application becomes a Deployment plus a ClusterIP Service sharing
//! the application name. Both carry the managed-by label so observation can
//! find them again.

use converge::ApplicationSpec;
use serde_json::{Map, Value, json};

/// Label holding the application name
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Label marking objects owned by berth
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on owned objects
pub const MANAGER: &str = "berth";

/// Label selector matching every managed object
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGER}")
}

fn labels(spec: &ApplicationSpec) -> Value {
    json!({
        NAME_LABEL: spec.name,
        MANAGED_BY_LABEL: MANAGER,
    })
}

fn resources(spec: &ApplicationSpec) -> Value {
    let mut limits = Map::new();
    if let Some(cpu) = &spec.limits.cpu {
        limits.insert("cpu".to_string(), json!(cpu));
    }
    if let Some(memory) = &spec.limits.memory {
        limits.insert("memory".to_string(), json!(memory));
    }
    if limits.is_empty() {
        json!({})
    } else {
        json!({ "limits": limits })
    }
}

/// Render the Deployment for an application
pub fn deployment(spec: &ApplicationSpec) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": labels(spec),
        },
        "spec": {
            "replicas": spec.replicas,
            "selector": {
                "matchLabels": { NAME_LABEL: spec.name },
            },
            "template": {
                "metadata": { "labels": labels(spec) },
                "spec": {
                    "containers": [{
                        "name": spec.name,
                        "image": spec.image,
                        "ports": [{ "containerPort": spec.port }],
                        "readinessProbe": {
                            "httpGet": {
                                "path": spec.health_check_path,
                                "port": spec.port,
                            },
                            "initialDelaySeconds": 5,
                            "periodSeconds": 10,
                        },
                        "resources": resources(spec),
                    }],
                },
            },
        },
    })
}

/// Render the Service fronting an application
pub fn service(spec: &ApplicationSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": labels(spec),
        },
        "spec": {
            "type": "ClusterIP",
            "selector": { NAME_LABEL: spec.name },
            "ports": [{
                "port": spec.port,
                "targetPort": spec.port,
            }],
        },
    })
}

/// Render both objects as a single `List` for `kubectl apply -f -`
pub fn render(spec: &ApplicationSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [deployment(spec), service(spec)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::ResourceLimits;

    fn spec() -> ApplicationSpec {
        ApplicationSpec {
            name: "flask-app".to_string(),
            namespace: "web".to_string(),
            image: "flask-app:1.2".to_string(),
            replicas: 3,
            port: 5000,
            health_check_path: "/health".to_string(),
            limits: ResourceLimits {
                cpu: Some("500m".to_string()),
                memory: None,
            },
        }
    }

    #[test]
    fn test_deployment_fields() {
        let d = deployment(&spec());
        assert_eq!(d["kind"], "Deployment");
        assert_eq!(d["metadata"]["namespace"], "web");
        assert_eq!(d["metadata"]["labels"][MANAGED_BY_LABEL], "berth");
        assert_eq!(d["spec"]["replicas"], 3);
        assert_eq!(d["spec"]["selector"]["matchLabels"][NAME_LABEL], "flask-app");

        let container = &d["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], "flask-app");
        assert_eq!(container["image"], "flask-app:1.2");
        assert_eq!(container["readinessProbe"]["httpGet"]["path"], "/health");
        assert_eq!(container["readinessProbe"]["httpGet"]["port"], 5000);
        assert_eq!(container["resources"]["limits"]["cpu"], "500m");
        assert!(container["resources"]["limits"].get("memory").is_none());
    }

    #[test]
    fn test_no_limits_renders_empty_resources() {
        let mut s = spec();
        s.limits = ResourceLimits::default();
        let d = deployment(&s);
        let resources = &d["spec"]["template"]["spec"]["containers"][0]["resources"];
        assert_eq!(resources, &json!({}));
    }

    #[test]
    fn test_service_targets_container_port() {
        let svc = service(&spec());
        assert_eq!(svc["kind"], "Service");
        assert_eq!(svc["spec"]["selector"][NAME_LABEL], "flask-app");
        assert_eq!(svc["spec"]["ports"][0]["port"], 5000);
        assert_eq!(svc["spec"]["ports"][0]["targetPort"], 5000);
    }

    #[test]
    fn test_render_list() {
        let list = render(&spec());
        assert_eq!(list["kind"], "List");
        assert_eq!(list["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(managed_selector(), "app.kubernetes.io/managed-by=berth");
    }
}
