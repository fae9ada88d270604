//! Thin async wrapper around the `git` executable.
//!
//! Partial clones and sparse checkouts are driven through the CLI; libgit2
//! only inspects the result (see [`crate::repo`]).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{MirrorError, Result};

#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `git <args>` in `cwd` and return trimmed stdout.
    ///
    /// The child is killed if the timeout elapses or the future is dropped.
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, cwd = %cwd.display(), "running git");

        let child = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MirrorError::GitUnavailable,
                _ => MirrorError::Io(e),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(MirrorError::Timeout {
                    command,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(MirrorError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
