//! `berth validate` - load and check a spec without touching the cluster

use anyhow::Result;
use converge::{ExitStatus, group_by_namespace, loader};
use std::path::Path;

use crate::ui;

pub fn run(spec: &Path) -> Result<ExitStatus> {
    ui::header("Validating Deployment Spec");

    let specs = loader::load(spec)?;
    let plans = group_by_namespace(&specs);

    println!();
    for plan in &plans {
        ui::info(&format!(
            "{} ({} application(s))",
            plan.namespace,
            plan.specs.len()
        ));
        for app in &plan.specs {
            ui::dim(&format!(
                "  {} {} ×{} :{}{}",
                app.name, app.image, app.replicas, app.port, app.health_check_path
            ));
        }
    }

    println!();
    ui::kv("Fingerprint", &loader::fingerprint(&specs)?);
    ui::success(&format!(
        "{} application(s) in {} namespace(s) are valid",
        specs.len(),
        plans.len()
    ));
    Ok(ExitStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("web.json"),
            r#"{"apps": [{"name": "flask-app", "namespace": "web", "image": "flask-app:1",
                "replicas": 2, "port": 5000, "healthCheckPath": "/health"}]}"#,
        )
        .unwrap();
        assert_eq!(run(dir.path()).unwrap(), ExitStatus::Success);
    }

    #[test]
    fn test_validate_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = run(&dir.path().join("absent.toml")).unwrap_err();
        assert!(
            err.downcast_ref::<converge::Error>()
                .is_some_and(converge::Error::is_invalid_spec)
        );
    }
}
