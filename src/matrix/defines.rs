//! Preprocessor defines harvested from the generated build settings.
//!
//! gn writes a `v8_build_config.json` record into every output directory.
//! A fixed set of boolean settings maps onto the public V8 feature macros
//! that consumers must compile with; the result is kept in a `BTreeSet` so
//! the serialized list is stable across runs with identical input.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// The build settings relevant for define derivation. gn emits many more
/// keys; unknown ones are ignored and absent ones default to false.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub is_debug: bool,
    pub is_full_debug: bool,
    pub v8_enable_v8_checks: bool,
    pub v8_enable_sandbox: bool,
    pub sandbox: bool,
    pub v8_enable_pointer_compression: bool,
    pub pointer_compression: bool,
    pub v8_enable_31bit_smis_on_64bit_arch: bool,
    pub v8_deprecation_warnings: bool,
    pub v8_imminent_deprecation_warnings: bool,
}

/// Load the build settings record from an output directory.
pub fn load(path: &Path) -> Result<BuildSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading build settings '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing build settings '{}'", path.display()))
}

/// Map build settings to the define set consumers must see.
pub fn extract_defines(settings: &BuildSettings) -> BTreeSet<&'static str> {
    let mut defines = BTreeSet::new();

    if settings.is_debug || settings.is_full_debug || settings.v8_enable_v8_checks {
        defines.insert("V8_ENABLE_CHECKS");
    }

    if settings.v8_enable_sandbox || settings.sandbox {
        defines.insert("V8_ENABLE_SANDBOX");
    }

    // pointer compression implies the 31-bit smi representation
    if settings.v8_enable_pointer_compression || settings.pointer_compression {
        defines.insert("V8_COMPRESS_POINTERS");
        defines.insert("V8_31BIT_SMIS_ON_64BIT_ARCH");
    }

    if settings.v8_enable_31bit_smis_on_64bit_arch {
        defines.insert("V8_31BIT_SMIS_ON_64BIT_ARCH");
    }

    if settings.v8_deprecation_warnings {
        defines.insert("V8_DEPRECATION_WARNINGS");
    }

    if settings.v8_imminent_deprecation_warnings {
        defines.insert("V8_IMMINENT_DEPRECATION_WARNINGS");
    }

    defines
}

/// Semicolon-joined serialization, deterministic by set order.
pub fn join_defines(defines: &BTreeSet<&'static str>) -> String {
    defines.iter().copied().collect::<Vec<_>>().join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_like_settings_enable_runtime_checks() {
        for settings in [
            BuildSettings {
                is_debug: true,
                ..BuildSettings::default()
            },
            BuildSettings {
                is_full_debug: true,
                ..BuildSettings::default()
            },
            BuildSettings {
                v8_enable_v8_checks: true,
                ..BuildSettings::default()
            },
        ] {
            assert!(extract_defines(&settings).contains("V8_ENABLE_CHECKS"));
        }
        assert!(extract_defines(&BuildSettings::default()).is_empty());
    }

    #[test]
    fn pointer_compression_implies_31bit_smis() {
        let settings = BuildSettings {
            v8_enable_pointer_compression: true,
            ..BuildSettings::default()
        };
        let defines = extract_defines(&settings);
        assert!(defines.contains("V8_COMPRESS_POINTERS"));
        assert!(defines.contains("V8_31BIT_SMIS_ON_64BIT_ARCH"));

        // the explicit smi flag is a union, not an overwrite
        let settings = BuildSettings {
            v8_enable_pointer_compression: true,
            v8_enable_31bit_smis_on_64bit_arch: true,
            ..BuildSettings::default()
        };
        assert_eq!(extract_defines(&settings), defines);

        let settings = BuildSettings {
            v8_enable_31bit_smis_on_64bit_arch: true,
            ..BuildSettings::default()
        };
        let defines = extract_defines(&settings);
        assert!(defines.contains("V8_31BIT_SMIS_ON_64BIT_ARCH"));
        assert!(!defines.contains("V8_COMPRESS_POINTERS"));
    }

    #[test]
    fn each_deprecation_flag_has_its_own_symbol() {
        let settings = BuildSettings {
            v8_deprecation_warnings: true,
            v8_imminent_deprecation_warnings: true,
            ..BuildSettings::default()
        };
        let defines = extract_defines(&settings);
        assert!(defines.contains("V8_DEPRECATION_WARNINGS"));
        assert!(defines.contains("V8_IMMINENT_DEPRECATION_WARNINGS"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let settings = BuildSettings {
            is_debug: true,
            sandbox: true,
            pointer_compression: true,
            ..BuildSettings::default()
        };
        let joined = join_defines(&extract_defines(&settings));
        assert_eq!(
            joined,
            "V8_31BIT_SMIS_ON_64BIT_ARCH;V8_COMPRESS_POINTERS;V8_ENABLE_CHECKS;V8_ENABLE_SANDBOX"
        );
    }

    #[test]
    fn unknown_json_keys_are_ignored() {
        let settings: BuildSettings = serde_json::from_str(
            r#"{"is_debug": true, "target_cpu": "x64", "v8_current_cpu": "x64"}"#,
        )
        .expect("parse settings");
        assert!(settings.is_debug);
        assert!(!settings.sandbox);
    }
}
