//! MSVC toolchain identity resolution.
//!
//! The resolver is a pure function over an explicit environment snapshot so
//! later stages receive a plain [`ToolchainInfo`] value instead of reading
//! ambient process state. The snapshot itself is captured once, in the
//! binary, via [`ToolchainEnv::capture`].

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::error::ToolchainResolutionError;

/// Known Visual Studio major versions: selector, product year, toolset id.
/// Ordered oldest to newest.
pub const VS_VERSIONS: &[(&str, &str, &str)] = &[
    ("12.0", "2013", "v120"),
    ("14.0", "2015", "v140"),
    ("15.0", "2017", "v141"),
    ("16.0", "2019", "v142"),
    ("17.0", "2022", "v143"),
];

/// Selector assumed when the environment does not carry one.
pub const DEFAULT_VS_VERSION: &str = "14.0";

/// Suffix appended to the toolset id in legacy XP mode.
pub const XP_TOOLSET_SUFFIX: &str = "_xp";

/// Snapshot of the toolchain-related environment inputs.
#[derive(Debug, Clone, Default)]
pub struct ToolchainEnv {
    pub visual_studio_version: Option<String>,
    pub vc_tools_install_dir: Option<String>,
    pub vc_install_dir: Option<String>,
    pub vc_tools_version: Option<String>,
}

impl ToolchainEnv {
    /// Capture the snapshot from the process environment.
    pub fn capture() -> Self {
        Self {
            visual_studio_version: std::env::var("VisualStudioVersion").ok(),
            vc_tools_install_dir: std::env::var("VCToolsInstallDir").ok(),
            vc_install_dir: std::env::var("VCINSTALLDIR").ok(),
            vc_tools_version: std::env::var("VCToolsVersion").ok(),
        }
    }
}

/// Resolved toolchain identity, threaded explicitly into later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainInfo {
    pub install_dir: PathBuf,
    pub toolset: String,
    pub version: String,
}

fn newest_toolset() -> &'static str {
    // the table is non-empty by construction
    VS_VERSIONS[VS_VERSIONS.len() - 1].2
}

/// Derive the active toolchain from the environment snapshot.
///
/// `VCToolsInstallDir` wins over the parent of `VCINSTALLDIR`; an exact
/// `VCToolsVersion` overrides the table-derived human version and re-derives
/// the toolset id from its leading digits.
pub fn resolve(env: &ToolchainEnv, xp_toolset: bool) -> Result<ToolchainInfo> {
    let selector = env
        .visual_studio_version
        .as_deref()
        .unwrap_or(DEFAULT_VS_VERSION);
    let (_, year, table_toolset) = VS_VERSIONS
        .iter()
        .find(|(known, _, _)| *known == selector)
        .ok_or_else(|| ToolchainResolutionError::UnknownVersion(selector.to_string()))?;

    let mut version = year.to_string();
    let mut toolset = table_toolset.to_string();

    let install_dir = if let Some(dir) = &env.vc_tools_install_dir {
        PathBuf::from(dir)
    } else if let Some(dir) = &env.vc_install_dir {
        Path::new(dir)
            .parent()
            .map(Path::to_path_buf)
            .ok_or(ToolchainResolutionError::MissingInstallDir)?
    } else {
        return Err(ToolchainResolutionError::MissingInstallDir.into());
    };

    if let Some(exact) = &env.vc_tools_version {
        version = exact.clone();
        let digits: String = exact.chars().filter(|c| *c != '.').take(3).collect();
        toolset = format!("v{}", digits);
    }

    if xp_toolset {
        if toolset.starts_with(newest_toolset()) {
            return Err(ToolchainResolutionError::LegacyToolsetUnsupported(toolset).into());
        }
        toolset.push_str(XP_TOOLSET_SUFFIX);
    }

    Ok(ToolchainInfo {
        install_dir,
        toolset,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(selector: Option<&str>) -> ToolchainEnv {
        ToolchainEnv {
            visual_studio_version: selector.map(String::from),
            vc_tools_install_dir: Some(r"C:\VS\VC\Tools\MSVC\14.29.30133".to_string()),
            vc_install_dir: None,
            vc_tools_version: None,
        }
    }

    #[test]
    fn the_selector_defaults_to_vs2015() {
        let info = resolve(&env_with(None), false).expect("resolve");
        assert_eq!(info.toolset, "v140");
        assert_eq!(info.version, "2015");
    }

    #[test]
    fn known_selectors_map_through_the_table() {
        let info = resolve(&env_with(Some("17.0")), false).expect("resolve");
        assert_eq!(info.toolset, "v143");
        assert_eq!(info.version, "2022");
    }

    #[test]
    fn unknown_selectors_are_fatal() {
        let err = resolve(&env_with(Some("9.0")), false).expect_err("unknown selector");
        assert!(err.chain().any(|c| c.is::<ToolchainResolutionError>()));
    }

    #[test]
    fn a_missing_install_dir_is_fatal() {
        let env = ToolchainEnv {
            visual_studio_version: Some("16.0".to_string()),
            ..ToolchainEnv::default()
        };
        assert!(resolve(&env, false).is_err());
    }

    #[test]
    fn vcinstalldir_falls_back_to_its_parent() {
        let env = ToolchainEnv {
            visual_studio_version: Some("16.0".to_string()),
            vc_install_dir: Some("/opt/vs/VC".to_string()),
            ..ToolchainEnv::default()
        };
        let info = resolve(&env, false).expect("resolve");
        assert_eq!(info.install_dir, PathBuf::from("/opt/vs"));
    }

    #[test]
    fn tools_install_dir_wins_over_vcinstalldir() {
        let env = ToolchainEnv {
            visual_studio_version: Some("16.0".to_string()),
            vc_tools_install_dir: Some("/opt/vs/VC/Tools/MSVC/14.29".to_string()),
            vc_install_dir: Some("/opt/vs/VC".to_string()),
            ..ToolchainEnv::default()
        };
        let info = resolve(&env, false).expect("resolve");
        assert_eq!(info.install_dir, PathBuf::from("/opt/vs/VC/Tools/MSVC/14.29"));
    }

    #[test]
    fn an_exact_version_rederives_the_toolset() {
        let mut env = env_with(Some("16.0"));
        env.vc_tools_version = Some("14.29.30133".to_string());
        let info = resolve(&env, false).expect("resolve");
        assert_eq!(info.version, "14.29.30133");
        assert_eq!(info.toolset, "v142");
    }

    #[test]
    fn legacy_mode_appends_the_xp_suffix() {
        let info = resolve(&env_with(Some("14.0")), true).expect("resolve");
        assert_eq!(info.toolset, "v140_xp");
    }

    #[test]
    fn legacy_mode_rejects_the_newest_toolset() {
        let err = resolve(&env_with(Some("17.0")), true).expect_err("xp with v143");
        assert!(err.chain().any(|c| c.is::<ToolchainResolutionError>()));
    }
}
