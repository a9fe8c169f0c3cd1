//! Error taxonomy for the build pipeline.
//!
//! Every stage has its own error type so the binary can map a failure to a
//! distinct exit code. External tool failures carry the exact command line
//! and exit status, which is propagated verbatim as the process exit code.
//! All errors are fatal; the only bounded retry in the whole pipeline is the
//! single wipe-and-retry inside the incremental fetch.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Bad CLI input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid build option '{0}', expected KEY=VALUE")]
    MalformedOption(String),

    #[error("unknown platform '{0}', expected one of: x86, x64, arm64")]
    UnknownPlatform(String),

    #[error("unknown configuration '{0}', expected one of: Debug, Release")]
    UnknownConfiguration(String),

    #[error("unknown library '{0}', expected one of: shared, monolith")]
    UnknownLibraryShape(String),
}

/// Source retrieval failure. The incremental strategy retries exactly once
/// from a wiped target directory; everything else fails immediately.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("git init of '{}' failed: {status}", .target.display())]
    Init { target: PathBuf, status: ExitStatus },

    #[error("git fetch of {url}@{reference} into '{}' failed after retry", .target.display())]
    RetryExhausted {
        url: String,
        reference: String,
        target: PathBuf,
    },

    #[error("git checkout of {reference} in '{}' failed: {status}", .target.display())]
    Checkout {
        reference: String,
        target: PathBuf,
        status: ExitStatus,
    },

    #[error("downloading archive {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("extracting archive {url} into '{}' failed: {source}", .target.display())]
    Extract {
        url: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The dependency manifest did not parse under the restricted grammar.
#[derive(Debug, Error)]
#[error("malformed dependency manifest '{}': {message}", .path.display())]
pub struct ManifestError {
    pub path: PathBuf,
    pub message: String,
}

/// A named version component is missing from the version header.
#[derive(Debug, Error)]
#[error("missing '#define {component}' in '{}'", .path.display())]
pub struct VersionFormatError {
    pub path: PathBuf,
    pub component: String,
}

/// Toolchain identity could not be derived from the environment snapshot.
#[derive(Debug, Error)]
pub enum ToolchainResolutionError {
    #[error("unsupported VisualStudioVersion '{0}'")]
    UnknownVersion(String),

    #[error("neither VCToolsInstallDir nor VCINSTALLDIR is set")]
    MissingInstallDir,

    #[error("XP toolset is not supported with toolset {0}")]
    LegacyToolsetUnsupported(String),
}

/// The build-graph generator or the build executor exited nonzero.
#[derive(Debug, Error)]
#[error("build tool `{command}` failed: {status}")]
pub struct BuildToolError {
    pub command: String,
    pub status: ExitStatus,
}

/// The packaging client exited nonzero.
#[derive(Debug, Error)]
#[error("packaging tool `{command}` failed: {status}")]
pub struct PackagingToolError {
    pub command: String,
    pub status: ExitStatus,
}

/// Map a pipeline failure to the process exit code.
///
/// External tool exits are propagated verbatim (1 when the tool was killed by
/// a signal); resolver failures get a distinct code per stage.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<BuildToolError>() {
            return e.status.code().unwrap_or(1);
        }
        if let Some(e) = cause.downcast_ref::<PackagingToolError>() {
            return e.status.code().unwrap_or(1);
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if cause.downcast_ref::<FetchError>().is_some() {
            return 3;
        }
        if cause.downcast_ref::<ManifestError>().is_some() {
            return 4;
        }
        if cause.downcast_ref::<VersionFormatError>().is_some() {
            return 5;
        }
        if cause.downcast_ref::<ToolchainResolutionError>().is_some() {
            return 6;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_errors_map_to_distinct_codes() {
        let config: anyhow::Error = ConfigError::MalformedOption("x".into()).into();
        let manifest: anyhow::Error = ManifestError {
            path: PathBuf::from("DEPS"),
            message: "bad".into(),
        }
        .into();
        let toolchain: anyhow::Error =
            ToolchainResolutionError::UnknownVersion("9.0".into()).into();

        assert_eq!(exit_code(&config), 2);
        assert_eq!(exit_code(&manifest), 4);
        assert_eq!(exit_code(&toolchain), 6);
    }

    #[test]
    fn wrapped_errors_are_still_found_in_the_chain() {
        let err = anyhow::Error::from(VersionFormatError {
            path: PathBuf::from("v8-version.h"),
            component: "V8_MAJOR_VERSION".into(),
        })
        .context("reading V8 version");
        assert_eq!(exit_code(&err), 5);
    }

    #[test]
    fn unknown_errors_fall_back_to_one() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), 1);
    }
}
