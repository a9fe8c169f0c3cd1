//! V8 version extraction from `include/v8-version.h`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::error::VersionFormatError;

/// The four version components, in reading order.
pub const VERSION_COMPONENTS: [&str; 4] = [
    "V8_MAJOR_VERSION",
    "V8_MINOR_VERSION",
    "V8_BUILD_NUMBER",
    "V8_PATCH_LEVEL",
];

/// Read the dotted version string from the version header.
///
/// Each component must appear as a `#define NAME <integer>` line; a missing
/// component is a [`VersionFormatError`].
pub fn read_version(header: &Path) -> Result<String> {
    let text = fs::read_to_string(header)
        .with_context(|| format!("reading version header '{}'", header.display()))?;

    let mut parts = Vec::with_capacity(VERSION_COMPONENTS.len());
    for component in VERSION_COMPONENTS {
        let value = extract_define(&text, component).ok_or_else(|| VersionFormatError {
            path: header.to_path_buf(),
            component: component.to_string(),
        })?;
        parts.push(value);
    }
    Ok(parts.join("."))
}

/// Find the integer literal of a `#define NAME <integer>` line.
fn extract_define(text: &str, name: &str) -> Option<String> {
    for line in text.lines() {
        let Some(rest) = line.trim_end().strip_prefix("#define") else {
            continue;
        };
        let mut tokens = rest.split_whitespace();
        if tokens.next() != Some(name) {
            continue;
        }
        let Some(value) = tokens.next() else {
            continue;
        };
        if tokens.next().is_none() && value.bytes().all(|b| b.is_ascii_digit()) {
            return Some(value.to_string());
        }
    }
    None
}
