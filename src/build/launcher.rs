//! Subprocess launching with an explicit environment.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Everything needed to start the build tool. The environment map is the
/// complete environment of the child; nothing is inherited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    /// The child was terminated by a signal (for example a cancelled job).
    Terminated,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

pub trait ProcessLauncher {
    fn run(&self, spec: &ProcessSpec) -> Result<ExitOutcome>;
}

/// Launches real processes via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

/// Kills the child if it is still running when dropped, so an early return
/// never leaves an orphaned build behind.
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = match self.0.as_mut() {
            Some(child) => child.wait()?,
            None => {
                return Err(std::io::Error::other("child already reaped"));
            }
        };
        self.0 = None;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn run(&self, spec: &ProcessSpec) -> Result<ExitOutcome> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .current_dir(&spec.dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::BuildExecution(format!(
                    "failed to start {}: {e}",
                    spec.program.display()
                ))
            })?;

        let mut guard = ChildGuard(Some(child));
        let status = guard
            .wait()
            .map_err(|e| Error::BuildExecution(format!("failed to wait for build: {e}")))?;

        Ok(match status.code() {
            Some(code) => ExitOutcome::Exited(code),
            None => ExitOutcome::Terminated,
        })
    }
}
