//! Build and package V8 from sources.
//!
//! This crate drives the whole pipeline from a versioned source reference to
//! a set of NuGet packages, one build per (platform, configuration, library)
//! cell:
//!
//! ```text
//! v8-packager
//!     │
//!     ├── config     - CLI flags into a validated BuildConfig
//!     ├── fetch      - V8 tree + allow-listed DEPS dependencies (git or tarball)
//!     ├── version    - dotted version from include/v8-version.h
//!     ├── toolchain  - MSVC toolset from an explicit environment snapshot
//!     ├── matrix     - gn gen + ninja per build cell, define harvesting
//!     └── package    - conditioned property sheets + nuget pack
//! ```
//!
//! All external tools (`git`, `gn`, `ninja`, `nuget`) are consumed through
//! narrow subprocess interfaces; the crate never compiles or inspects C++
//! itself. Execution is strictly sequential and the first failure aborts the
//! run. See the module docs for the per-stage contracts.

pub mod config;
pub mod error;
pub mod fetch;
pub mod matrix;
pub mod package;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod toolchain;
pub mod version;

pub use config::{BuildConfig, Cli, Configuration, LibraryShape, OptionValue, Platform};
pub use fetch::{FetchStrategy, SourceRef};
pub use toolchain::{ToolchainEnv, ToolchainInfo};
