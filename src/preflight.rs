//! Preflight checks for the external build tools.
//!
//! Validates that the host has the tools the pipeline will invoke before any
//! fetching starts. This prevents cryptic mid-run errors, in particular after
//! a long source fetch.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::BuildConfig;

/// Check if a command exists, either as a concrete file path or on PATH.
pub fn tool_exists(tool: &Path) -> bool {
    tool.is_file() || which::which(tool).is_ok()
}

/// Check the tools the configured run will actually invoke.
///
/// A read-version run stops after fetch and version extraction, so only
/// `git` matters there; full runs also need the generator, the executor and
/// the packaging client.
pub fn check_host_tools(config: &BuildConfig) -> Result<()> {
    let mut required: Vec<&Path> = Vec::new();
    if !config.skip_fetch && !config.use_archive {
        required.push(Path::new("git"));
    }
    if !config.read_version_only {
        required.push(&config.gn);
        required.push(&config.ninja);
        required.push(Path::new("nuget"));
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|tool| !tool_exists(tool))
        .map(|tool| tool.display().to_string())
        .collect();

    if !missing.is_empty() {
        bail!("missing required host tools: {}", missing.join(", "));
    }
    Ok(())
}
