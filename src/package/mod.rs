//! NuGet packaging for built library shapes.
//!
//! Each shape maps to a fixed package name set. Per package, the template
//! property sheet gets the platform/toolset match condition and the
//! accumulated per-configuration define fragments substituted in, and
//! `nuget pack` runs against the matching nuspec. The transient property
//! sheet lives exactly as long as the pack invocation: an RAII guard deletes
//! it on success and on every failure path alike.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Configuration, LibraryShape, Platform};
use crate::error::PackagingToolError;
use crate::process::Cmd;

/// Directory holding nuspec files and property-sheet templates.
pub const NUGET_DIR: &str = "nuget";

/// Package names produced for each library shape.
pub fn packages_for(shape: LibraryShape) -> &'static [&'static str] {
    match shape {
        LibraryShape::Shared => &["v8", "v8.redist", "v8.symbols"],
        LibraryShape::Monolith => &["v8.monolith"],
    }
}

/// MSBuild platform match. x86 binaries serve both identifiers MSBuild has
/// used for 32-bit x86 over the years.
pub fn platform_condition(platform: Platform) -> String {
    match platform {
        Platform::X86 => "('$(Platform)' == 'x86' Or '$(Platform)' == 'Win32')".to_string(),
        other => format!("'$(Platform)' == '{}'", other.id()),
    }
}

/// Full property-sheet condition: active toolset and matching platform.
pub fn package_condition(platform: Platform, toolset: &str) -> String {
    format!(
        "'$(PlatformToolset)' == '{}' And {}",
        toolset,
        platform_condition(platform)
    )
}

/// One conditioned `<PreprocessorDefinitions>` fragment for a configuration.
pub fn config_fragment(configuration: Configuration, defines: &str) -> String {
    format!(
        "\n\t<PreprocessorDefinitions Condition=\"'$(Configuration)' == '{}'\">{};%(PreprocessorDefinitions)</PreprocessorDefinitions>\n\t",
        configuration, defines
    )
}

/// Substitute the condition and define placeholders into a template sheet.
pub fn render_sheet(template: &str, condition: &str, defines_fragments: &str) -> String {
    let sheet = template.replace("$Condition$", condition);
    if defines_fragments.is_empty() {
        sheet
    } else {
        sheet.replace("<PreprocessorDefinitions />", defines_fragments)
    }
}

/// Deletes the transient property sheet when dropped, so packaging failures
/// cannot leave it behind.
struct SheetGuard {
    path: PathBuf,
}

impl Drop for SheetGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Pack every package of a built shape for one platform.
pub fn publish_shape(
    shape: LibraryShape,
    platform: Platform,
    toolset: &str,
    version: &str,
    build_version: &str,
    defines_fragments: &str,
) -> Result<()> {
    let condition = package_condition(platform, toolset);

    for name in packages_for(shape) {
        let template_path = Path::new(NUGET_DIR).join(format!("{}.props", name));
        let template = fs::read_to_string(&template_path).with_context(|| {
            format!(
                "reading property sheet template '{}'",
                template_path.display()
            )
        })?;
        let sheet = render_sheet(&template, &condition, defines_fragments);

        let sheet_path = Path::new(NUGET_DIR).join(format!("{}-{}-{}.props", name, toolset, platform));
        fs::write(&sheet_path, sheet)
            .with_context(|| format!("writing property sheet '{}'", sheet_path.display()))?;
        let _guard = SheetGuard {
            path: sheet_path.clone(),
        };

        let nuspec = format!("{}.nuspec", name);
        println!(
            "[package] nuget pack {} for V8 {} {} {}",
            nuspec, version, toolset, platform
        );
        let mut pack = Cmd::new("nuget");
        pack.arg("pack")
            .arg(&nuspec)
            .arg("-NoPackageAnalysis")
            .arg("-Version")
            .arg(version)
            .arg("-Properties")
            .arg(format!(
                "Platform={};PlatformToolset={};BuildVersion={}",
                platform, toolset, build_version
            ))
            .arg("-OutputDirectory")
            .arg("..")
            .current_dir(NUGET_DIR);
        let status = pack.status()?;
        if !status.success() {
            return Err(PackagingToolError {
                command: pack.display(),
                status,
            }
            .into());
        }
    }
    Ok(())
}
