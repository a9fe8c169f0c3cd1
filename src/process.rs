//! Thin builder over `std::process::Command`.
//!
//! External tools run synchronously with inherited stdio so their progress is
//! visible. Callers that need a typed failure (build vs packaging tool) take
//! the raw `ExitStatus` from [`Cmd::status`] and wrap it themselves; `run` is
//! for invocations where any nonzero exit is simply fatal.

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// The command line as one printable string, for diagnostics.
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run the command and return its exit status.
    ///
    /// Failing to spawn at all (missing binary, bad cwd) is an error here;
    /// a nonzero exit is not, so callers can decide what it means.
    pub fn status(&mut self) -> Result<ExitStatus> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
            .status()
            .with_context(|| format!("running `{}`", self.display()))
    }

    /// Run the command and fail on any nonzero exit.
    pub fn run(&mut self) -> Result<()> {
        let status = self.status()?;
        if !status.success() {
            bail!("`{}` failed: {}", self.display(), status);
        }
        Ok(())
    }
}
