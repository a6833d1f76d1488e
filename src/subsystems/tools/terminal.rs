//! `terminal`: run one command line.
//!
//! By default the line is split with shell quoting rules (`shlex`)
//! and the program is executed directly, without a shell, only if it is in
//! `allowed_commands`.  `allow_shell = true` hands the raw line to `sh -c`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::config::TerminalToolConfig;

use super::error::ToolError;

#[derive(Debug, Clone)]
pub struct TerminalTool {
    allowed_commands: Vec<String>,
    allow_shell: bool,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl TerminalTool {
    pub fn new(config: &TerminalToolConfig) -> Self {
        Self {
            allowed_commands: config.allowed_commands.clone(),
            allow_shell: config.allow_shell,
            timeout: Duration::from_secs(config.timeout_secs),
            working_dir: config.working_dir.clone(),
        }
    }

    pub async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let line = input.trim();
        if line.is_empty() {
            return Err(ToolError::InvalidInput("empty command".into()));
        }

        let mut cmd = if self.allow_shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        } else {
            let argv = split_command_line(line)?;
            let Some((program, args)) = argv.split_first() else {
                return Err(ToolError::InvalidInput("empty command".into()));
            };
            if !self.allowed_commands.iter().any(|c| c == program) {
                return Err(ToolError::Denied(format!("command not allowed: {program}")));
            }
            let mut c = Command::new(program);
            c.args(args);
            c
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %line, shell = self.allow_shell, "running terminal command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(command = %line, error = %e, "failed to start command");
                return Err(ToolError::Backend(format!("failed to start command: {e}")));
            }
            Err(_) => {
                warn!(command = %line, "command timed out");
                return Err(ToolError::Timeout(format!(
                    "command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(command = %line, status = %output.status, "command failed");
        if stderr.trim().is_empty() {
            Err(ToolError::Backend(format!("command exited with {}", output.status)))
        } else {
            Err(ToolError::Backend(stderr))
        }
    }
}

/// Split a command line into argv with POSIX shell quoting rules.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ToolError> {
    shlex::split(line).ok_or_else(|| ToolError::InvalidInput("unbalanced quotes or trailing backslash".into()))
}
