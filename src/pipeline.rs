//! Sequential pipeline from source reference to packed packages.
//!
//! Stage order is fixed: preflight, fetch, dependency resolution, version
//! extraction, toolchain resolution, workspace preparation, matrix build,
//! packaging. Every stage is fallible and the first failure aborts the run;
//! there is no rollback of work already done.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::BuildConfig;
use crate::fetch::{self, deps, FetchStrategy, SourceRef};
use crate::preflight;
use crate::toolchain::{self, ToolchainEnv};
use crate::version;

/// Directory the main source tree is fetched into, relative to the working
/// directory. Dependency paths and build output directories live under it.
pub const SOURCE_DIR: &str = "v8";

/// Stub written when the fetched tree has no gclient args file; gn refuses
/// to run without one.
const GCLIENT_ARGS: &str = "declare_args() { checkout_google_benchmark = false }\n";

/// Run the configured pipeline to completion.
pub fn run(config: &BuildConfig, env: &ToolchainEnv) -> Result<()> {
    preflight::check_host_tools(config)?;

    let source_dir = Path::new(SOURCE_DIR);
    if config.skip_fetch && source_dir.exists() {
        println!("[fetch] skip fetching, {} already exists", SOURCE_DIR);
    } else {
        let strategy = if config.use_archive {
            FetchStrategy::Archive
        } else {
            FetchStrategy::Incremental
        };
        let main_tree = SourceRef::new(config.source_url.clone(), config.version.clone());
        fetch::fetch(&main_tree, source_dir, strategy)?;
        deps::fetch_required(&source_dir.join("DEPS"), strategy, config.use_clang)?;
    }

    let v8_version = version::read_version(&source_dir.join("include/v8-version.h"))?;
    println!("[version] V8 {}", v8_version);
    if config.read_version_only {
        return Ok(());
    }

    let toolchain = toolchain::resolve(env, config.xp_toolset)?;
    println!(
        "[toolchain] Visual Studio {} in '{}'",
        toolchain.version,
        toolchain.install_dir.display()
    );
    println!("[toolchain] C++ toolset {}", toolchain.toolset);

    prepare_workspace(config)?;
    crate::matrix::run(config, &toolchain, &v8_version)
}

/// Prepare the fetched tree for generation: put gn where the tree's own
/// scripts expect it and make sure the gclient args file exists.
fn prepare_workspace(config: &BuildConfig) -> Result<()> {
    let buildtools = Path::new(SOURCE_DIR).join("buildtools/win");
    fs::create_dir_all(&buildtools)
        .with_context(|| format!("creating buildtools directory '{}'", buildtools.display()))?;
    let gn_name = config
        .gn
        .file_name()
        .ok_or_else(|| anyhow!("gn path '{}' has no file name", config.gn.display()))?;
    fs::copy(&config.gn, buildtools.join(gn_name)).with_context(|| {
        format!(
            "copying '{}' into '{}'",
            config.gn.display(),
            buildtools.display()
        )
    })?;

    let gclient_args = Path::new(SOURCE_DIR).join("build/config/gclient_args.gni");
    if !gclient_args.is_file() {
        if let Some(parent) = gclient_args.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory '{}'", parent.display()))?;
        }
        fs::write(&gclient_args, GCLIENT_ARGS)
            .with_context(|| format!("writing '{}'", gclient_args.display()))?;
    }
    Ok(())
}
