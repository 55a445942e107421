use crate::config::schema::CommandStep;
use crate::error::{PadError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Interpreter a command line is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// `cmd /C` on Windows, `/bin/sh -c` elsewhere.
    System,
    /// Windows PowerShell, or `pwsh` where that is what exists.
    PowerShell,
}

impl Shell {
    fn command(self, line: &str) -> tokio::process::Command {
        let mut cmd = match self {
            Self::System if cfg!(windows) => {
                let mut c = tokio::process::Command::new("cmd");
                c.arg("/C");
                c
            }
            Self::System => {
                let mut c = tokio::process::Command::new("/bin/sh");
                c.arg("-c");
                c
            }
            Self::PowerShell => {
                let program = if cfg!(windows) { "powershell" } else { "pwsh" };
                let mut c = tokio::process::Command::new(program);
                c.args(["-NoProfile", "-NonInteractive", "-Command"]);
                c
            }
        };
        cmd.arg(line);
        cmd.kill_on_drop(true);
        cmd
    }

    fn kind(self) -> &'static str {
        match self {
            Self::System => "shell_command",
            Self::PowerShell => "power_shell_command",
        }
    }
}

/// Execute a single command line and wait for it.
///
/// # Errors
/// Returns `PadError::Io` if the interpreter cannot be spawned,
/// or `PadError::ActionExecution` if it exits with a non-zero status.
pub async fn execute(shell: Shell, command: &str) -> Result<String> {
    let output = shell.command(command).output().await?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !stdout.is_empty() {
            debug!("shell output: {stdout}");
        }
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("command failed ({}): {stderr}", output.status);
        Err(PadError::action(
            shell.kind(),
            format!("`{command}` exited with {}: {}", output.status, stderr.trim()),
        ))
    }
}

/// Run `steps` in order, honouring each step's delay. Stops at the first
/// failure. Returns the output of the last step.
///
/// # Errors
/// See [`execute`].
pub async fn run_steps(shell: Shell, steps: &[CommandStep]) -> Result<String> {
    let mut last = String::new();
    for step in steps {
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        debug!("running: {}", step.command);
        last = execute(shell, &step.command).await?;
    }
    Ok(last)
}
