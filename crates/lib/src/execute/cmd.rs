//! Shell command execution.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, CommandStatus, ExecuteError};

/// Run `cmd` through the shell in `cwd`.
///
/// The process inherits the caller's environment. Both output streams are
/// captured and trimmed; a nonzero exit status is returned as data, not as an
/// error.
///
/// # Arguments
///
/// * `cmd` - The command string to execute
/// * `cwd` - Working directory for the command
/// * `shell` - Shell override (defaults to /bin/sh on Unix, powershell.exe on Windows)
pub async fn run_command(cmd: &str, cwd: &Path, shell: Option<&str>) -> Result<CommandOutput, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  let (shell_cmd, shell_args) = get_shell(shell);

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");

  let output = Command::new(&shell_cmd)
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .output()
    .await
    .map_err(|source| ExecuteError::Spawn {
      cmd: cmd.to_string(),
      shell: shell_cmd.clone(),
      source,
    })?;

  let status = CommandStatus::from_exit_status(output.status);
  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command stdout");
  }
  debug!(cmd = %cmd, status = %status, "command finished");

  Ok(CommandOutput { status, stdout, stderr })
}

/// Get the shell command and arguments for the current platform.
///
/// An explicit override picks its flag from the shell's name. Without one,
/// `/bin/sh` (Unix) or `powershell.exe` (Windows) is used rather than `$SHELL`,
/// so commands do not depend on the user's interactive profile.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
