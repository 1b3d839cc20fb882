//! Small helpers for release and image tooling built on the process runner

use crate::errors::{IsolateError, Result};
use crate::execution::{ProcessExecutor, ProcessSpec};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// SHA-256 of a file's content, formatted as `sha256:<hex>`
pub fn file_hash(path: &Path) -> Result<String> {
    debug!("Calculate hash of {}", path.display());
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Version part of a `<name>-<version>.tar` file name
pub fn version_from_file_name(path: &Path) -> Result<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("tar") {
        return Err(IsolateError::InvalidConfig(format!(
            "*.tar file expected in {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(IsolateError::InvalidConfig(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    match stem.split_once('-') {
        Some((_, version)) => Ok(version.to_string()),
        None => Err(IsolateError::InvalidConfig(format!(
            "Invalid file name pattern: {}, expected *-{{version}}.tar, for example image-0.1.0.tar",
            path.display()
        ))),
    }
}

/// Image reference for `repository` at `version`.
///
/// `+` (local version separator) is not allowed in image tags and becomes `-`.
pub fn image_tag(repository: &str, version: &str) -> String {
    format!("{}:{}", repository, version.replace('+', "-"))
}

/// ID of the local image tagged `tag`, empty if there is none
pub fn image_id(tag: &str) -> Result<String> {
    let outcome = ProcessExecutor::run(
        ProcessSpec::new(["docker", "images", "-q", tag])
            .verbose(false)
            .check(false),
    )?;
    Ok(outcome.stdout.lines().next().unwrap_or_default().to_string())
}

/// Remove the local image tagged `tag`, keeping untagged parents
pub fn remove_image(tag: &str) -> Result<String> {
    info!("Removing image {} from the local registry", tag);
    let id = image_id(tag)?;
    if id.is_empty() {
        return Err(IsolateError::InvalidConfig(format!("No local image tagged {}", tag)));
    }
    ProcessExecutor::run(ProcessSpec::new(["docker", "rmi", id.as_str(), "--no-prune"]))
        .map(|outcome| outcome.stdout)
}

/// Parse a duration given in (fractional) seconds; empty means none
pub fn as_duration(value: &str) -> Result<Option<Duration>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let seconds: f64 = value
        .parse()
        .map_err(|_| IsolateError::InvalidConfig(format!("Invalid duration: {}", value)))?;
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|e| IsolateError::InvalidConfig(format!("Invalid duration {}: {}", value, e)))
}
