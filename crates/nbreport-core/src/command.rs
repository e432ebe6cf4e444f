// nbreport-core/src/command.rs
// ============================================================================
// Module: External Command Invocation
// Description: Async subprocess execution with impersonation and timeouts.
// Purpose: Run git and the report engines with captured output and bounds.
// Dependencies: tokio, crate::identity
// ============================================================================

//! ## Overview
//! Every out-of-process call in the service (git synchronization, template
//! execution, HTML conversion) goes through [`run_command`]. Commands run
//! with captured stdout/stderr, an optional working directory, an optional
//! bounded timeout, and optionally under another OS account's uid/gid. The
//! privilege switch happens through the spawn attributes of the child
//! process, never by wrapping the command line in a shell.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::identity::OsAccount;

// ============================================================================
// SECTION: Command Specification
// ============================================================================

/// Specification for one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program and arguments; `argv[0]` is the program.
    pub argv: Vec<String>,
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
    /// OS account to impersonate, or `None` to run as the service identity.
    pub run_as: Option<OsAccount>,
    /// Bound on the child's wall-clock runtime.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Creates a spec running as the service identity with no timeout.
    #[must_use]
    pub const fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            run_as: None,
            timeout: None,
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    /// Sets the impersonated account.
    #[must_use]
    pub fn run_as(mut self, account: Option<OsAccount>) -> Self {
        self.run_as = account;
        self
    }

    /// Sets the runtime bound.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the command line joined for error reporting.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// External command invocation errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be spawned.
    #[error("failed to spawn `{command}`: {detail}")]
    Spawn {
        /// Joined command line.
        command: String,
        /// Spawn failure detail.
        detail: String,
    },
    /// The child exited with a non-zero status.
    #[error("command `{command}` failed with status {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        /// Joined command line.
        command: String,
        /// Exit code, or `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The child exceeded its runtime bound and was killed.
    #[error("command `{command}` timed out after {}s", timeout.as_secs())]
    TimedOut {
        /// Joined command line.
        command: String,
        /// The bound that expired.
        timeout: Duration,
    },
    /// Waiting for the child failed.
    #[error("failed to collect output of `{command}`: {detail}")]
    Wait {
        /// Joined command line.
        command: String,
        /// Wait failure detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Runs an external command to completion with captured output.
///
/// # Errors
///
/// Returns [`CommandError`] when the command cannot be spawned, exits with a
/// non-zero status, or exceeds its timeout. On timeout the child process is
/// killed before the error is returned.
pub async fn run_command(spec: CommandSpec) -> Result<CommandOutput, CommandError> {
    let command_line = spec.command_line();
    let Some((program, args)) = spec.argv.split_first() else {
        return Err(CommandError::Spawn {
            command: command_line,
            detail: "empty argv".to_string(),
        });
    };
    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    // Dropping the wait future on timeout must reap the child.
    command.kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    if let Some(account) = &spec.run_as {
        command.uid(account.uid);
        command.gid(account.gid);
    }
    let child = command.spawn().map_err(|err| CommandError::Spawn {
        command: command_line.clone(),
        detail: err.to_string(),
    })?;
    let wait = child.wait_with_output();
    let output = match spec.timeout {
        Some(limit) => {
            tokio::time::timeout(limit, wait).await.map_err(|_| CommandError::TimedOut {
                command: command_line.clone(),
                timeout: limit,
            })?
        }
        None => wait.await,
    }
    .map_err(|err| CommandError::Wait {
        command: command_line.clone(),
        detail: err.to_string(),
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command_line,
            code: output.status.code(),
            stderr,
        });
    }
    Ok(CommandOutput {
        stdout,
        stderr,
    })
}
