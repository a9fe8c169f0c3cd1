//! Source retrieval at a versioned reference.
//!
//! Two strategies: a shallow incremental git fetch into a reusable target
//! directory, and a one-shot gitiles tarball download. The incremental
//! strategy is the only retried operation in the pipeline, and the retry is
//! bounded: wipe the target, reinitialize, fetch once more, then give up.

pub mod deps;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::path::Path;

use crate::error::FetchError;
use crate::process::Cmd;

/// A repository URL plus the reference to fetch from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub url: String,
    pub reference: String,
}

impl SourceRef {
    pub fn new(url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reference: reference.into(),
        }
    }

    /// Parse a `<url>.git@<ref>` spec as found in dependency manifests.
    /// Without the `@` part the reference defaults to `HEAD`.
    pub fn parse(spec: &str) -> SourceRef {
        match spec.split_once(".git@") {
            Some((url, reference)) => SourceRef {
                url: format!("{}.git", url),
                reference: reference.to_string(),
            },
            None => SourceRef {
                url: spec.to_string(),
                reference: "HEAD".to_string(),
            },
        }
    }
}

/// A reference is a content hash iff it is exactly 40 hex digits.
pub fn is_commit_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Shallow git fetch with one wipe-and-retry.
    Incremental,
    /// Gitiles tar.gz download, no retry.
    Archive,
}

/// Fetch `source` into `target` using the given strategy.
pub fn fetch(source: &SourceRef, target: &Path, strategy: FetchStrategy) -> Result<()> {
    match strategy {
        FetchStrategy::Incremental => fetch_incremental(source, target),
        FetchStrategy::Archive => fetch_archive(source, target),
    }
}

fn fetch_incremental(source: &SourceRef, target: &Path) -> Result<()> {
    println!(
        "[fetch] git fetch {}@{} into '{}'",
        source.url,
        source.reference,
        target.display()
    );

    if !target.join(".git").is_dir() {
        git_init(target)?;
    }

    if !git_fetch_once(source, target)? {
        println!("[fetch] retry: '{}'", target.display());
        remove_target(target)?;
        git_init(target)?;
        if !git_fetch_once(source, target)? {
            remove_target(target)?;
            return Err(FetchError::RetryExhausted {
                url: source.url.clone(),
                reference: source.reference.clone(),
                target: target.to_path_buf(),
            }
            .into());
        }
    }

    checkout_fetched_head(source, target)
}

fn git_init(target: &Path) -> Result<()> {
    let status = Cmd::new("git").arg("init").arg(target).status()?;
    if !status.success() {
        return Err(FetchError::Init {
            target: target.to_path_buf(),
            status,
        }
        .into());
    }
    Ok(())
}

/// One shallow fetch attempt. `Ok(false)` means the fetch itself exited
/// nonzero and the caller decides whether to retry.
fn git_fetch_once(source: &SourceRef, target: &Path) -> Result<bool> {
    let status = Cmd::new("git")
        .args([
            "fetch",
            "--depth=1",
            "--update-shallow",
            "--update-head-ok",
            "--verbose",
        ])
        .arg(&source.url)
        .arg(&source.reference)
        .current_dir(target)
        .status()?;
    Ok(status.success())
}

/// Force a deterministically named local branch onto the fetched head,
/// discarding local modifications.
fn checkout_fetched_head(source: &SourceRef, target: &Path) -> Result<()> {
    let branch = format!("Branch_{}", source.reference);
    let status = Cmd::new("git")
        .args(["checkout", "-f", "-B"])
        .arg(&branch)
        .arg("FETCH_HEAD")
        .current_dir(target)
        .status()?;
    if !status.success() {
        return Err(FetchError::Checkout {
            reference: source.reference.clone(),
            target: target.to_path_buf(),
            status,
        }
        .into());
    }
    Ok(())
}

fn remove_target(target: &Path) -> Result<()> {
    if target.is_dir() {
        fs::remove_dir_all(target)
            .with_context(|| format!("removing fetch target '{}'", target.display()))?;
    }
    Ok(())
}

/// Gitiles archive URL for a reference: hashes are used verbatim, branch
/// names live under the heads namespace.
pub(crate) fn archive_url(source: &SourceRef) -> String {
    let namespace = if is_commit_hash(&source.reference) {
        ""
    } else {
        "refs/heads/"
    };
    format!(
        "{}/+archive/{}{}.tar.gz",
        source.url, namespace, source.reference
    )
}

fn fetch_archive(source: &SourceRef, target: &Path) -> Result<()> {
    let url = archive_url(source);
    println!("[fetch] download {} into '{}'", url, target.display());

    let response = reqwest::blocking::get(&url)
        .and_then(|response| response.error_for_status())
        .map_err(|source| FetchError::Download {
            url: url.clone(),
            source,
        })?;

    fs::create_dir_all(target)
        .with_context(|| format!("creating fetch target '{}'", target.display()))?;

    let mut archive = tar::Archive::new(GzDecoder::new(response));
    archive.unpack(target).map_err(|source| FetchError::Extract {
        url: url.clone(),
        target: target.to_path_buf(),
        source,
    })?;

    let files = walkdir::WalkDir::new(target)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count();
    println!("[fetch] extracted {} files into '{}'", files, target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_hash_requires_exactly_forty_hex_digits() {
        assert!(is_commit_hash("5c9250c64c70a2f861a435158b57a6d43cd2e7b7"));
        assert!(is_commit_hash("5C9250C64C70A2F861A435158B57A6D43CD2E7B7"));
        // 39 digits
        assert!(!is_commit_hash("5c9250c64c70a2f861a435158b57a6d43cd2e7b"));
        // 41 digits
        assert!(!is_commit_hash("5c9250c64c70a2f861a435158b57a6d43cd2e7b7a"));
        // right length, not hex
        assert!(!is_commit_hash("gc9250c64c70a2f861a435158b57a6d43cd2e7b7"));
        assert!(!is_commit_hash("10.6-lkgr"));
    }

    #[test]
    fn source_ref_parses_url_at_reference_specs() {
        let source = SourceRef::parse("https://chromium.googlesource.com/v8/v8.git@10.6-lkgr");
        assert_eq!(source.url, "https://chromium.googlesource.com/v8/v8.git");
        assert_eq!(source.reference, "10.6-lkgr");

        let source = SourceRef::parse("https://chromium.googlesource.com/chromium/src/build.git");
        assert_eq!(source.reference, "HEAD");
    }

    #[test]
    fn archive_urls_namespace_branches_but_not_hashes() {
        let branch = SourceRef::new("https://host/v8/v8.git", "10.6-lkgr");
        assert_eq!(
            archive_url(&branch),
            "https://host/v8/v8.git/+archive/refs/heads/10.6-lkgr.tar.gz"
        );

        let hash = SourceRef::new(
            "https://host/chromium/src/build.git",
            "5c9250c64c70a2f861a435158b57a6d43cd2e7b7",
        );
        assert_eq!(
            archive_url(&hash),
            "https://host/chromium/src/build.git/+archive/5c9250c64c70a2f861a435158b57a6d43cd2e7b7.tar.gz"
        );
    }

    /// Stub `git` on PATH that counts `fetch` calls in a state file and fails
    /// the first `fails` of them. `init` and `checkout` always succeed.
    #[cfg(unix)]
    fn install_stub_git(dir: &Path, fails: u32) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let counter = dir.join("fetch_calls");
        let script = format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
             init) mkdir -p \"$2/.git\"; exit 0;;\n\
             fetch)\n\
               count=$(cat {counter} 2>/dev/null || echo 0)\n\
               count=$((count + 1))\n\
               echo $count > {counter}\n\
               [ $count -le {fails} ] && exit 1\n\
               exit 0;;\n\
             esac\n\
             exit 0\n",
            counter = counter.display(),
            fails = fails,
        );
        let bin = dir.join("bin");
        fs::create_dir_all(&bin).expect("create stub bin dir");
        let git = bin.join("git");
        fs::write(&git, script).expect("write stub git");
        fs::set_permissions(&git, fs::Permissions::from_mode(0o755)).expect("chmod stub git");
        counter
    }

    #[cfg(unix)]
    fn with_stub_git_on_path<T>(stub_bin: &Path, body: impl FnOnce() -> T) -> T {
        let old_path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![stub_bin.to_path_buf()];
        paths.extend(std::env::split_paths(&old_path));
        let new_path = std::env::join_paths(paths).expect("join PATH");
        std::env::set_var("PATH", &new_path);
        let result = body();
        std::env::set_var("PATH", old_path);
        result
    }

    /// Both retry scenarios run inside one test so the PATH override never
    /// races a parallel test.
    #[cfg(unix)]
    #[test]
    fn incremental_fetch_retries_exactly_once() {
        let source = SourceRef::new("https://host/v8/v8.git", "lkgr");

        // first attempt fails, retry succeeds
        let temp = tempfile::tempdir().expect("tempdir");
        let counter = install_stub_git(temp.path(), 1);
        let target = temp.path().join("v8");
        with_stub_git_on_path(&temp.path().join("bin"), || {
            fetch(&source, &target, FetchStrategy::Incremental).expect("fetch with one retry");
        });
        let calls = fs::read_to_string(&counter).expect("read fetch counter");
        assert_eq!(calls.trim(), "2");
        assert!(target.join(".git").is_dir());

        // both attempts fail: fatal, target removed
        let temp = tempfile::tempdir().expect("tempdir");
        let counter = install_stub_git(temp.path(), 99);
        let target = temp.path().join("v8");
        let result = with_stub_git_on_path(&temp.path().join("bin"), || {
            fetch(&source, &target, FetchStrategy::Incremental)
        });
        let err = result.expect_err("second failure must be fatal");
        assert!(err.chain().any(|cause| cause.is::<FetchError>()));
        let calls = fs::read_to_string(&counter).expect("read fetch counter");
        assert_eq!(calls.trim(), "2", "no third attempt");
        assert!(!target.exists(), "failed target must not linger");
    }
}
