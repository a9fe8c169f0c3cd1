//! CLI flags into a validated build configuration.
//!
//! Platform, configuration and library selections are checked against fixed
//! enumerations; the version reference is normalized to a last-known-good
//! branch when it is a bare numeric prefix; `--gn-option KEY=VAL` overrides
//! are coerced and merged into the base gn option set.

use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Parser)]
#[command(
    name = "v8-packager",
    about = "Build V8 from sources and pack NuGet packages"
)]
pub struct Cli {
    /// Do not fetch sources
    #[arg(long = "no-fetch")]
    pub no_fetch: bool,

    /// Download tarball instead of Git fetch
    #[arg(long = "no-git")]
    pub no_git: bool,

    /// Read actual V8 version from v8-version.h, do no build
    #[arg(long = "read-version")]
    pub read_version: bool,

    /// Source url
    #[arg(long, default_value = "https://chromium.googlesource.com/v8/v8.git")]
    pub url: String,

    /// Version tag or branch name
    #[arg(long, default_value = "lkgr")]
    pub version: String,

    /// Target platforms
    #[arg(long = "platform", num_args = 1.., default_values = ["x86", "x64", "arm64"])]
    pub platforms: Vec<String>,

    /// Target configurations
    #[arg(long = "config", num_args = 1.., default_values = ["Debug", "Release"])]
    pub configs: Vec<String>,

    /// Target libraries
    #[arg(long = "libs", num_args = 1.., default_values = ["shared", "monolith"])]
    pub libs: Vec<String>,

    /// Build for Windows XP toolset
    #[arg(long = "xp")]
    pub xp: bool,

    /// Compile with clang
    #[arg(long = "use-clang")]
    pub use_clang: bool,

    /// Path to gn executable
    #[arg(long, default_value = "bin/gn.exe")]
    pub gn: PathBuf,

    /// Path to ninja executable
    #[arg(long, default_value = "bin/ninja.exe")]
    pub ninja: PathBuf,

    /// Add gn option
    #[arg(long = "gn-option", value_name = "KEY=VAL", num_args = 1..)]
    pub gn_options: Vec<String>,
}

/// Target platform of a build cell. The id doubles as gn's `target_cpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    X86,
    X64,
    Arm64,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::X86, Platform::X64, Platform::Arm64];

    pub fn id(self) -> &'static str {
        match self {
            Platform::X86 => "x86",
            Platform::X64 => "x64",
            Platform::Arm64 => "arm64",
        }
    }

    pub fn from_arg(value: &str) -> Result<Self, ConfigError> {
        match value {
            "x86" => Ok(Platform::X86),
            "x64" => Ok(Platform::X64),
            "arm64" => Ok(Platform::Arm64),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Build configuration of a cell. Debug turns on the debug-mode gn flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Configuration {
    Debug,
    Release,
}

impl Configuration {
    pub const ALL: [Configuration; 2] = [Configuration::Debug, Configuration::Release];

    pub fn id(self) -> &'static str {
        match self {
            Configuration::Debug => "Debug",
            Configuration::Release => "Release",
        }
    }

    pub fn is_debug(self) -> bool {
        matches!(self, Configuration::Debug)
    }

    pub fn from_arg(value: &str) -> Result<Self, ConfigError> {
        match value {
            "Debug" => Ok(Configuration::Debug),
            "Release" => Ok(Configuration::Release),
            other => Err(ConfigError::UnknownConfiguration(other.to_string())),
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Library shape: component DLLs or one self-contained static monolith.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LibraryShape {
    Shared,
    Monolith,
}

impl LibraryShape {
    pub const ALL: [LibraryShape; 2] = [LibraryShape::Shared, LibraryShape::Monolith];

    pub fn id(self) -> &'static str {
        match self {
            LibraryShape::Shared => "shared",
            LibraryShape::Monolith => "monolith",
        }
    }

    pub fn is_monolithic(self) -> bool {
        matches!(self, LibraryShape::Monolith)
    }

    pub fn from_arg(value: &str) -> Result<Self, ConfigError> {
        match value {
            "shared" => Ok(LibraryShape::Shared),
            "monolith" => Ok(LibraryShape::Monolith),
            other => Err(ConfigError::UnknownLibraryShape(other.to_string())),
        }
    }
}

impl fmt::Display for LibraryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A typed gn option value. Overrides coerce integer first, then boolean
/// words, else keep the string.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl OptionValue {
    pub fn coerce(raw: &str) -> OptionValue {
        if let Ok(n) = raw.parse::<i64>() {
            return OptionValue::Int(n);
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => OptionValue::Bool(true),
            "false" | "no" | "off" => OptionValue::Bool(false),
            _ => OptionValue::Str(raw.to_string()),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Validated, normalized build configuration. Created once from the CLI and
/// read-only afterwards; per-cell option sets are composed by overlay, never
/// by mutating `gn_options` in place.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub platforms: Vec<Platform>,
    pub configurations: Vec<Configuration>,
    pub libs: Vec<LibraryShape>,
    pub version: String,
    pub source_url: String,
    pub skip_fetch: bool,
    pub use_archive: bool,
    pub read_version_only: bool,
    pub use_clang: bool,
    pub xp_toolset: bool,
    pub gn: PathBuf,
    pub ninja: PathBuf,
    pub gn_options: BTreeMap<String, OptionValue>,
}

impl BuildConfig {
    pub fn resolve(cli: Cli) -> Result<BuildConfig> {
        let platforms = cli
            .platforms
            .iter()
            .map(|value| Platform::from_arg(value))
            .collect::<Result<Vec<_>, _>>()?;
        let configurations = cli
            .configs
            .iter()
            .map(|value| Configuration::from_arg(value))
            .collect::<Result<Vec<_>, _>>()?;
        let libs = cli
            .libs
            .iter()
            .map(|value| LibraryShape::from_arg(value))
            .collect::<Result<Vec<_>, _>>()?;

        let mut gn_options = default_gn_options();
        for raw in &cli.gn_options {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedOption(raw.clone()))?;
            gn_options.insert(key.to_string(), OptionValue::coerce(value));
        }

        Ok(BuildConfig {
            platforms,
            configurations,
            libs,
            version: normalize_version(&cli.version),
            source_url: cli.url,
            skip_fetch: cli.no_fetch,
            use_archive: cli.no_git,
            read_version_only: cli.read_version,
            use_clang: cli.use_clang,
            xp_toolset: cli.xp,
            gn: anchor_tool_path(cli.gn),
            ninja: anchor_tool_path(cli.ninja),
            gn_options,
        })
    }
}

/// The build tools later run with the source tree as their working directory,
/// so a relative path with a directory component is anchored to the invocation
/// directory here. Bare names resolve on PATH and stay as given.
fn anchor_tool_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() || path.components().count() < 2 {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Base gn options; `--gn-option` overrides merge on top of these.
pub fn default_gn_options() -> BTreeMap<String, OptionValue> {
    let defaults = [
        ("treat_warnings_as_errors", OptionValue::Bool(false)),
        ("fatal_linker_warnings", OptionValue::Bool(false)),
        ("use_jumbo_build", OptionValue::Bool(true)),
        ("v8_enable_fast_mksnapshot", OptionValue::Bool(false)),
        ("v8_enable_fast_torque", OptionValue::Bool(false)),
        // verify_heap breaks the VC++ linker in Debug configurations
        ("v8_enable_verify_heap", OptionValue::Bool(false)),
        ("v8_use_external_startup_data", OptionValue::Bool(false)),
        ("use_custom_libcxx", OptionValue::Bool(false)),
    ];
    defaults
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Bare numeric references track the last-known-good branch: fewer than two
/// dot separators and all-numeric segments gets a `-lkgr` suffix.
pub fn normalize_version(reference: &str) -> String {
    let segments: Vec<&str> = reference.split('.').collect();
    let all_numeric = segments
        .iter()
        .all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()));
    if segments.len() - 1 < 2 && all_numeric {
        format!("{}-lkgr", reference)
    } else {
        reference.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn bare_numeric_versions_get_the_lkgr_suffix() {
        assert_eq!(normalize_version("11.0"), "11.0-lkgr");
        assert_eq!(normalize_version("11"), "11-lkgr");
    }

    #[test]
    fn full_versions_and_branch_names_are_unchanged() {
        assert_eq!(normalize_version("11.0.226"), "11.0.226");
        assert_eq!(normalize_version("11.0.226.4"), "11.0.226.4");
        assert_eq!(normalize_version("lkgr"), "lkgr");
        assert_eq!(normalize_version("main"), "main");
        assert_eq!(normalize_version("10.6-lkgr"), "10.6-lkgr");
    }

    #[test]
    fn override_values_coerce_int_then_bool_then_string() {
        assert_eq!(OptionValue::coerce("1"), OptionValue::Int(1));
        assert_eq!(OptionValue::coerce("0"), OptionValue::Int(0));
        assert_eq!(OptionValue::coerce("-3"), OptionValue::Int(-3));
        assert_eq!(OptionValue::coerce("True"), OptionValue::Bool(true));
        assert_eq!(OptionValue::coerce("YES"), OptionValue::Bool(true));
        assert_eq!(OptionValue::coerce("on"), OptionValue::Bool(true));
        assert_eq!(OptionValue::coerce("off"), OptionValue::Bool(false));
        assert_eq!(OptionValue::coerce("no"), OptionValue::Bool(false));
        assert_eq!(
            OptionValue::coerce("level1"),
            OptionValue::Str("level1".to_string())
        );
    }

    #[test]
    fn overrides_merge_into_the_default_option_set() {
        let cli = Cli::parse_from([
            "v8-packager",
            "--gn-option",
            "use_jumbo_build=false",
            "symbol_level=1",
        ]);
        let config = BuildConfig::resolve(cli).expect("resolve config");
        assert_eq!(
            config.gn_options.get("use_jumbo_build"),
            Some(&OptionValue::Bool(false))
        );
        assert_eq!(
            config.gn_options.get("symbol_level"),
            Some(&OptionValue::Int(1))
        );
        // untouched defaults survive the merge
        assert_eq!(
            config.gn_options.get("use_custom_libcxx"),
            Some(&OptionValue::Bool(false))
        );
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        let cli = Cli::parse_from(["v8-packager", "--gn-option", "no_equals_sign"]);
        assert!(BuildConfig::resolve(cli).is_err());
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let cli = Cli::parse_from(["v8-packager", "--platform", "mips"]);
        assert!(BuildConfig::resolve(cli).is_err());

        let cli = Cli::parse_from(["v8-packager", "--config", "Profile"]);
        assert!(BuildConfig::resolve(cli).is_err());

        let cli = Cli::parse_from(["v8-packager", "--libs", "static"]);
        assert!(BuildConfig::resolve(cli).is_err());
    }

    #[test]
    fn defaults_cover_the_whole_matrix() {
        let cli = Cli::parse_from(["v8-packager"]);
        let config = BuildConfig::resolve(cli).expect("resolve config");
        assert_eq!(config.platforms, Platform::ALL.to_vec());
        assert_eq!(config.configurations, Configuration::ALL.to_vec());
        assert_eq!(config.libs, LibraryShape::ALL.to_vec());
        assert_eq!(config.version, "lkgr");
        assert!(!config.use_archive);
    }

    #[test]
    fn version_flag_is_normalized_during_resolution() {
        let cli = Cli::parse_from(["v8-packager", "--version", "11.0"]);
        let config = BuildConfig::resolve(cli).expect("resolve config");
        assert_eq!(config.version, "11.0-lkgr");
    }

    #[test]
    fn relative_tool_paths_are_anchored_to_the_invocation_directory() {
        let cli = Cli::parse_from(["v8-packager", "--gn", "bin/gn.exe", "--ninja", "ninja"]);
        let config = BuildConfig::resolve(cli).expect("resolve config");
        assert!(config.gn.is_absolute());
        assert!(config.gn.ends_with("bin/gn.exe"));
        // bare names are left for PATH lookup
        assert_eq!(config.ninja, PathBuf::from("ninja"));

        let absolute = if cfg!(windows) { r"C:\tools\gn.exe" } else { "/tools/gn" };
        let cli = Cli::parse_from(["v8-packager", "--gn", absolute]);
        let config = BuildConfig::resolve(cli).expect("resolve config");
        assert_eq!(config.gn, PathBuf::from(absolute));
    }
}
