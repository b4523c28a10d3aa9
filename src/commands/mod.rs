pub mod apply;
pub mod config;
pub mod diff;
pub mod status;
pub mod validate;

use anyhow::Result;
use converge::{ApplicationSpec, filter_by_target, loader};
use std::path::Path;

/// Load a spec source and narrow it to `target`
///
/// Load errors are returned unwrapped so the caller can map invalid specs
/// to their own exit code.
pub(crate) fn load_specs(source: &Path, target: Option<&str>) -> Result<Vec<ApplicationSpec>> {
    let specs = loader::load(source)?;
    Ok(filter_by_target(specs, target))
}

/// Whether a target names a single service rather than a whole namespace
pub(crate) fn targets_single_service(target: Option<&str>) -> bool {
    target.is_some_and(|t| t.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const APPS: &str = r#"
[[apps]]
name = "flask-app"
namespace = "web"
image = "flask-app:1"
replicas = 2
port = 5000
health_check_path = "/health"

[[apps]]
name = "swimming-app"
namespace = "swim"
image = "swimming-app:1"
replicas = 1
port = 8501
health_check_path = "/"
"#;

    #[test]
    fn test_load_specs_with_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apps.toml");
        fs::write(&path, APPS).unwrap();

        assert_eq!(load_specs(&path, None).unwrap().len(), 2);
        let swim = load_specs(&path, Some("swim")).unwrap();
        assert_eq!(swim.len(), 1);
        assert_eq!(swim[0].name, "swimming-app");
        assert!(load_specs(&path, Some("web/other")).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_spec_stays_downcastable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apps.toml");
        fs::write(&path, APPS.replace("replicas = 2", "replicas = -1")).unwrap();

        let err = load_specs(&path, None).unwrap_err();
        let spec_err = err.downcast_ref::<converge::Error>().unwrap();
        assert!(spec_err.is_invalid_spec());
    }

    #[test]
    fn test_targets_single_service() {
        assert!(targets_single_service(Some("web/flask-app")));
        assert!(!targets_single_service(Some("web")));
        assert!(!targets_single_service(None));
    }
}
