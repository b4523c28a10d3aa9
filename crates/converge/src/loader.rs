//! Spec loader - parses declarative application specs
//!
//! A spec source is a TOML or JSON file with a top-level `apps` list, or a
//! directory of such files. Everything is validated up front; any problem
//! yields [`Error::InvalidSpec`] and nothing is reconciled.

use crate::error::{Error, Result};
use crate::types::{ApplicationSpec, ResourceLimits};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static DNS_LABEL: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex is valid")
});

const MAX_LABEL_LEN: usize = 63;

/// On-disk format of a spec source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Toml,
    Json,
}

impl SpecFormat {
    /// Pick a format from a file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    fn is_spec_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("toml" | "json")
        )
    }
}

// Every field is optional here so a missing one is reported as an
// InvalidSpec naming the application, not as a bare parse error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpecFile {
    #[serde(default)]
    apps: Vec<RawApp>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawApp {
    name: Option<String>,
    namespace: Option<String>,
    image: Option<String>,
    replicas: Option<i64>,
    port: Option<i64>,
    #[serde(alias = "healthCheckPath")]
    health_check_path: Option<String>,
    #[serde(alias = "cpuLimit")]
    cpu_limit: Option<String>,
    #[serde(alias = "memLimit")]
    mem_limit: Option<String>,
}

/// Load application specs from a file or directory
///
/// Directories are walked recursively, following symlinks; `*.toml` and
/// `*.json` files are loaded in path order and concatenated. An entry
/// that cannot be read fails the whole load; a partial desired state is
/// never returned.
pub fn load(source: &Path) -> Result<Vec<ApplicationSpec>> {
    if !source.exists() {
        return Err(Error::SourceNotFound(source.to_path_buf()));
    }

    let files = if source.is_dir() {
        spec_files(source)?
    } else {
        vec![source.to_path_buf()]
    };

    let mut specs = Vec::new();
    for file in &files {
        let content = fs::read_to_string(file)
            .map_err(|e| Error::invalid(&file.display().to_string(), e.to_string()))?;
        let source_name = file.display().to_string();
        log::debug!("Loading specs from {source_name}");
        specs.extend(parse_apps(&content, SpecFormat::from_path(file), &source_name)?);
    }

    check_unique(&specs, &source.display().to_string())?;
    log::debug!("Loaded {} application spec(s)", specs.len());
    Ok(specs)
}

fn spec_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).display().to_string();
            Error::invalid(&path, format!("cannot read spec source: {e}"))
        })?;
        if entry.file_type().is_file() && SpecFormat::is_spec_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parse and validate specs from an in-memory string
pub fn parse_str(
    content: &str,
    format: SpecFormat,
    source_name: &str,
) -> Result<Vec<ApplicationSpec>> {
    let specs = parse_apps(content, format, source_name)?;
    check_unique(&specs, source_name)?;
    Ok(specs)
}

/// BLAKE3 digest of the desired state, stable for identical spec lists
pub fn fingerprint(specs: &[ApplicationSpec]) -> Result<String> {
    let canonical = serde_json::to_vec(specs)?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}

fn parse_apps(
    content: &str,
    format: SpecFormat,
    source_name: &str,
) -> Result<Vec<ApplicationSpec>> {
    let raw: RawSpecFile = match format {
        SpecFormat::Toml => {
            toml::from_str(content).map_err(|e| Error::invalid(source_name, e.to_string()))?
        }
        SpecFormat::Json => {
            serde_json::from_str(content).map_err(|e| Error::invalid(source_name, e.to_string()))?
        }
    };

    raw.apps
        .into_iter()
        .enumerate()
        .map(|(index, app)| validate(app, index, source_name))
        .collect()
}

fn validate(raw: RawApp, index: usize, source_name: &str) -> Result<ApplicationSpec> {
    let label = raw
        .name
        .clone()
        .unwrap_or_else(|| format!("apps[{index}]"));
    let fail = |message: String| Error::invalid(source_name, format!("{label}: {message}"));

    let name = raw.name.ok_or_else(|| fail("missing required field `name`".into()))?;
    let namespace = raw
        .namespace
        .ok_or_else(|| fail("missing required field `namespace`".into()))?;
    let image = raw
        .image
        .ok_or_else(|| fail("missing required field `image`".into()))?;
    let replicas = raw
        .replicas
        .ok_or_else(|| fail("missing required field `replicas`".into()))?;
    let port = raw
        .port
        .ok_or_else(|| fail("missing required field `port`".into()))?;
    let health_check_path = raw
        .health_check_path
        .ok_or_else(|| fail("missing required field `health_check_path`".into()))?;

    check_label("name", &name).map_err(&fail)?;
    check_label("namespace", &namespace).map_err(&fail)?;

    if image.is_empty() || image.chars().any(char::is_whitespace) {
        return Err(fail(format!("invalid image reference {image:?}")));
    }

    if replicas < 0 {
        return Err(fail(format!("replicas must be >= 0, got {replicas}")));
    }
    let replicas =
        u32::try_from(replicas).map_err(|_| fail(format!("replicas too large: {replicas}")))?;

    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| fail(format!("port must be in 1-65535, got {port}")))?;

    if !health_check_path.starts_with('/') {
        return Err(fail(format!(
            "health_check_path must start with '/', got {health_check_path:?}"
        )));
    }

    let limits = ResourceLimits {
        cpu: raw.cpu_limit,
        memory: raw.mem_limit,
    };
    if limits.cpu.as_deref() == Some("") || limits.memory.as_deref() == Some("") {
        return Err(fail("resource limits must not be empty".into()));
    }

    Ok(ApplicationSpec {
        name,
        namespace,
        image,
        replicas,
        port,
        health_check_path,
        limits,
    })
}

fn check_label(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.len() > MAX_LABEL_LEN || !DNS_LABEL.is_match(value) {
        return Err(format!("{field} {value:?} is not a valid DNS-1123 label"));
    }
    Ok(())
}

fn check_unique(specs: &[ApplicationSpec], source_name: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.target()) {
            return Err(Error::invalid(
                source_name,
                format!("duplicate application {}", spec.target()),
            ));
        }
    }
    Ok(())
}
