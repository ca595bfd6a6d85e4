//! Subprocess execution for build tasks.
//!
//! A task's command runs through the platform shell in the target's directory.
//! The exit status is captured but never interpreted here; deciding whether a
//! result is a failure is the job of the task's digest.

mod cmd;

use std::fmt;

use thiserror::Error;

pub use cmd::run_command;

/// Errors that prevent a command from producing a result at all.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The shell could not be spawned or its output could not be collected.
  #[error("failed to run `{cmd}` with {shell}: {source}")]
  Spawn {
    cmd: String,
    shell: String,
    #[source]
    source: std::io::Error,
  },
}

/// Exit status of a finished command: an exit code, a terminating signal, or both absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStatus {
  pub code: Option<i32>,
  pub signal: Option<i32>,
}

impl CommandStatus {
  pub fn success(&self) -> bool {
    self.code == Some(0) && self.signal.is_none()
  }

  pub(crate) fn from_exit_status(status: std::process::ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    Self {
      code: status.code(),
      signal,
    }
  }
}

impl fmt::Display for CommandStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.code, self.signal) {
      (_, Some(signal)) => write!(f, "terminated by signal {}", signal),
      (Some(code), None) => write!(f, "exited with code {}", code),
      (None, None) => f.write_str("exited with unknown status"),
    }
  }
}

/// Everything a digest receives about one command run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub status: CommandStatus,
  /// Captured stdout, trimmed.
  pub stdout: String,
  /// Captured stderr, trimmed.
  pub stderr: String,
}
