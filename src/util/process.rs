//! Subprocess execution utilities.
//!
//! Every toolchain invocation goes through [`ProcessBuilder`]. Spawning a
//! child is serialized behind one process-wide lock; waiting for it is not,
//! so many compilations still run at the same time.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use thiserror::Error;

/// Serializes `Command::spawn` across all worker threads.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// A subprocess ran but did not succeed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("`{command}` failed ({status})")]
    Failed { command: String, status: ExitStatus },
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run the command with stdin disconnected and the given output
    /// streams, returning its exit status.
    ///
    /// The `Command` (and with it the parent's copies of `stdout` and
    /// `stderr`) is dropped before this returns, so a pipe handed in here
    /// reaches end-of-stream once the child exits.
    pub fn status_with(&self, stdout: Stdio, stderr: Stdio) -> Result<ExitStatus> {
        tracing::debug!("EXEC: {}", self.display_command());

        let mut child = {
            let mut cmd = self.build_command();
            cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

            let _guard = SPAWN_LOCK.lock();
            cmd.spawn()
                .with_context(|| format!("failed to spawn `{}`", self.program.display()))?
        };

        child
            .wait()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))
    }

    /// Run with the given output streams and require success.
    pub fn run_with(&self, stdout: Stdio, stderr: Stdio) -> Result<()> {
        let status = self.status_with(stdout, stderr)?;
        if !status.success() {
            return Err(ProcessError::Failed {
                command: self.display_command(),
                status,
            }
            .into());
        }
        Ok(())
    }

    /// Run with both output streams inherited and require success.
    pub fn run(&self) -> Result<()> {
        self.run_with(Stdio::inherit(), Stdio::inherit())
    }

    /// Display the command for messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

impl fmt::Display for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_command())
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
