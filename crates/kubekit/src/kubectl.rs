//! Cluster client that shells out to `kubectl`.

use crate::error::{Error, Result};
use crate::manifest::{self, managed_selector};
use crate::observe::parse_observed;
use converge::{ApplicationSpec, ClusterClient, ClusterResult, ObservedState};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// Client that executes real `kubectl` commands.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    /// Path to the kubectl executable
    kubectl: PathBuf,
    /// Kube context; the current context when unset
    context: Option<String>,
    /// Per-request timeout passed to kubectl
    request_timeout: Option<Duration>,
}

impl KubectlClient {
    /// Create a client using the kubectl found in PATH.
    pub fn new() -> Result<Self> {
        let kubectl = which::which("kubectl").map_err(|_| Error::KubectlNotFound)?;
        Ok(Self::with_path(kubectl))
    }

    /// Create a client using a specific kubectl binary.
    pub fn with_path(kubectl: impl Into<PathBuf>) -> Self {
        Self {
            kubectl: kubectl.into(),
            context: None,
            request_timeout: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn kubectl_path(&self) -> &Path {
        &self.kubectl
    }

    /// Check if kubectl runs at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.kubectl)
            .args(["version", "--client"])
            .output()
            .is_ok_and(|o| o.status.success())
    }

    /// Full argument list: global flags, namespace, then the subcommand.
    fn command_args(&self, namespace: &str, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 6);
        if let Some(context) = &self.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        if let Some(timeout) = self.request_timeout {
            full.push(format!("--request-timeout={}s", timeout.as_secs().max(1)));
        }
        full.push("--namespace".to_string());
        full.push(namespace.to_string());
        full.extend(args.iter().map(|a| (*a).to_string()));
        full
    }

    /// Run a kubectl command, optionally feeding `stdin`.
    fn run(&self, namespace: &str, args: &[&str], stdin: Option<&str>) -> Result<Output> {
        let args = self.command_args(namespace, args);
        log::debug!("Running {} {}", self.kubectl.display(), args.join(" "));

        let mut command = Command::new(&self.kubectl);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match stdin {
            None => command.output(),
            Some(input) => command.stdin(Stdio::piped()).spawn().and_then(|mut child| {
                if let Some(mut pipe) = child.stdin.take() {
                    pipe.write_all(input.as_bytes())?;
                }
                child.wait_with_output()
            }),
        };

        output.map_err(|e| Error::CommandFailed {
            message: format!("failed to execute kubectl: {e}"),
            stderr: String::new(),
        })
    }

    /// Run a kubectl command and check for success.
    fn run_checked(
        &self,
        namespace: &str,
        args: &[&str],
        stdin: Option<&str>,
        resource: &str,
    ) -> Result<String> {
        let output = self.run(namespace, args, stdin)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_kubectl_output(&stderr, Some(resource)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Fetch managed Deployments and Pods in a namespace.
    pub fn observe(&self, namespace: &str) -> Result<Vec<ObservedState>> {
        let selector = managed_selector();
        let stdout = self.run_checked(
            namespace,
            &["get", "deployments,pods", "-l", &selector, "-o", "json"],
            None,
            namespace,
        )?;
        let json: serde_json::Value = serde_json::from_str(&stdout)?;
        parse_observed(namespace, &json)
    }

    /// Apply the Deployment and Service for an application.
    pub fn apply(&self, spec: &ApplicationSpec) -> Result<()> {
        let manifest = serde_json::to_string(&manifest::render(spec))?;
        let resource = format!("deployment/{}", spec.name);
        self.run_checked(&spec.namespace, &["apply", "-f", "-"], Some(&manifest), &resource)?;
        Ok(())
    }

    /// Set the replica count of a Deployment.
    pub fn scale(&self, name: &str, namespace: &str, replicas: u32) -> Result<()> {
        let resource = format!("deployment/{name}");
        let replicas = format!("--replicas={replicas}");
        self.run_checked(namespace, &["scale", &resource, &replicas], None, &resource)?;
        Ok(())
    }

    /// Point the application container of a Deployment at a new image.
    pub fn set_image(&self, name: &str, namespace: &str, image: &str) -> Result<()> {
        let resource = format!("deployment/{name}");
        let assignment = format!("{name}={image}");
        self.run_checked(
            namespace,
            &["set", "image", &resource, &assignment],
            None,
            &resource,
        )?;
        Ok(())
    }

    /// Delete the Deployment and Service of an application.
    pub fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        let deployment = format!("deployment/{name}");
        let service = format!("service/{name}");
        self.run_checked(
            namespace,
            &["delete", &deployment, &service, "--ignore-not-found"],
            None,
            &deployment,
        )?;
        Ok(())
    }
}

impl ClusterClient for KubectlClient {
    fn get_observed_state(&self, namespace: &str) -> ClusterResult<Vec<ObservedState>> {
        Ok(self.observe(namespace)?)
    }

    fn create_service(&self, spec: &ApplicationSpec) -> ClusterResult<()> {
        Ok(self.apply(spec)?)
    }

    fn scale_service(&self, name: &str, namespace: &str, replicas: u32) -> ClusterResult<()> {
        Ok(self.scale(name, namespace, replicas)?)
    }

    fn update_image(&self, name: &str, namespace: &str, image: &str) -> ClusterResult<()> {
        Ok(self.set_image(name, namespace, image)?)
    }

    fn delete_service(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        Ok(self.delete(name, namespace)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_minimal() {
        let client = KubectlClient::with_path("/usr/bin/kubectl");
        assert_eq!(
            client.command_args("swim", &["get", "pods"]),
            vec!["--namespace", "swim", "get", "pods"]
        );
    }

    #[test]
    fn test_command_args_with_context_and_timeout() {
        let client = KubectlClient::with_path("kubectl")
            .with_context(Some("kind-dev".to_string()))
            .with_request_timeout(Some(Duration::from_secs(30)));
        assert_eq!(
            client.command_args("flask", &["scale", "deployment/web", "--replicas=2"]),
            vec![
                "--context",
                "kind-dev",
                "--request-timeout=30s",
                "--namespace",
                "flask",
                "scale",
                "deployment/web",
                "--replicas=2",
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_command_failure() {
        let client = KubectlClient::with_path("/nonexistent/kubectl-berth-test");
        assert!(!client.is_available());

        let err = client.observe("swim").unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(!err.is_retryable());
    }
}
