//! Build matrix execution.
//!
//! One build cell per (platform, library, configuration), iterated in that
//! fixed nesting order. Every cell composes its own gn option set by overlay
//! on the immutable base from the configuration; nothing a cell adds is ever
//! visible to a later cell. The generator and executor run once per cell and
//! any nonzero exit aborts the run.

pub mod defines;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, Configuration, LibraryShape, OptionValue, Platform};
use crate::error::BuildToolError;
use crate::package;
use crate::pipeline::SOURCE_DIR;
use crate::process::Cmd;
use crate::toolchain::ToolchainInfo;

/// Keys forced per cell on top of the base option set.
const DEBUG_MODE_KEYS: [&str; 3] = ["is_debug", "is_full_debug", "enable_iterator_debugging"];

/// One point of the build matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildCell {
    pub platform: Platform,
    pub configuration: Configuration,
    pub shape: LibraryShape,
}

impl BuildCell {
    /// Deterministic output directory, relative to the source tree. Keyed by
    /// everything that distinguishes a cell, so no two cells of one run can
    /// collide.
    pub fn out_dir(&self, version: &str, toolset: &str) -> PathBuf {
        Path::new("out.gn")
            .join(version)
            .join(toolset)
            .join(self.platform.id())
            .join(self.configuration.id())
            .join(self.shape.id())
    }

    /// The executor target. The monolith has its own aggregate target.
    pub fn ninja_target(&self) -> &'static str {
        if self.shape.is_monolithic() {
            "v8_monolith"
        } else {
            "v8"
        }
    }
}

/// Compose the cell's option set: clone of the base plus the cell-derived
/// flags. The base is never mutated, so option state cannot leak between
/// cells.
pub fn compose_options(
    base: &BTreeMap<String, OptionValue>,
    cell: &BuildCell,
    use_clang: bool,
) -> BTreeMap<String, OptionValue> {
    let mut options = base.clone();
    let debug = cell.configuration.is_debug();
    for key in DEBUG_MODE_KEYS {
        options.insert(key.to_string(), OptionValue::Bool(debug));
    }
    options.insert(
        "target_cpu".to_string(),
        OptionValue::Str(cell.platform.id().to_string()),
    );
    options.insert("is_clang".to_string(), OptionValue::Bool(use_clang));
    options.insert(
        "is_component_build".to_string(),
        OptionValue::Bool(!cell.shape.is_monolithic()),
    );
    options.insert(
        "v8_monolithic".to_string(),
        OptionValue::Bool(cell.shape.is_monolithic()),
    );
    options
}

/// Serialize options as the generator's space-separated, lower-cased
/// `key=value` line. String values keep their quotes.
pub fn gn_args(options: &BTreeMap<String, OptionValue>) -> String {
    options
        .iter()
        .map(|(key, value)| format!("{}={}", key, value).to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the whole matrix and package each library shape as soon as all of its
/// configurations have built. Output directories are keyed by the normalized
/// build reference; packages carry the version extracted from the sources.
pub fn run(config: &BuildConfig, toolchain: &ToolchainInfo, v8_version: &str) -> Result<()> {
    for &platform in &config.platforms {
        for &shape in &config.libs {
            // per-shape accumulator, reset when a new shape starts
            let mut defines_fragments = String::new();
            for &configuration in &config.configurations {
                let cell = BuildCell {
                    platform,
                    configuration,
                    shape,
                };
                let out_dir = cell.out_dir(&config.version, &toolchain.toolset);
                build_cell(config, &cell, &out_dir)?;

                let settings_path = Path::new(SOURCE_DIR)
                    .join(&out_dir)
                    .join("v8_build_config.json");
                let settings = defines::load(&settings_path)?;
                let joined = defines::join_defines(&defines::extract_defines(&settings));
                defines_fragments.push_str(&package::config_fragment(configuration, &joined));
            }
            package::publish_shape(
                shape,
                platform,
                &toolchain.toolset,
                v8_version,
                &config.version,
                &defines_fragments,
            )?;
        }
    }
    Ok(())
}

/// Generate and build one cell inside the source tree.
fn build_cell(config: &BuildConfig, cell: &BuildCell, out_dir: &Path) -> Result<()> {
    println!(
        "[build] {} {} {} -> '{}'",
        cell.platform,
        cell.configuration,
        cell.shape,
        out_dir.display()
    );

    let options = compose_options(&config.gn_options, cell, config.use_clang);

    let mut gen = Cmd::new(&config.gn);
    gen.arg("gen")
        .arg(format!("--ninja-executable={}", config.ninja.display()))
        .arg(out_dir)
        .arg(format!("--args={}", gn_args(&options)))
        .current_dir(SOURCE_DIR)
        .env("DEPOT_TOOLS_WIN_TOOLCHAIN", "0");
    let status = gen.status()?;
    if !status.success() {
        return Err(BuildToolError {
            command: gen.display(),
            status,
        }
        .into());
    }

    let mut build = Cmd::new(&config.ninja);
    build
        .arg("-C")
        .arg(out_dir)
        .arg(cell.ninja_target())
        .current_dir(SOURCE_DIR)
        .env("DEPOT_TOOLS_WIN_TOOLCHAIN", "0");
    let status = build.status()?;
    if !status.success() {
        return Err(BuildToolError {
            command: build.display(),
            status,
        }
        .into());
    }
    Ok(())
}
