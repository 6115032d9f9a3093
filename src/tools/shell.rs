//! Shell command execution tool
//!
//! Runs a command line through the platform shell and reports its exit
//! status and captured output in a fixed textual layout.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::traits::{optional_str, required_str, Tool, ToolResult};
use crate::error::Result;

/// Default bound on a single command
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tool for executing shell commands
///
/// Commands that outlive the timeout are killed and whatever output they
/// had produced so far is returned.
pub struct ShellCommandTool {
    /// Directory commands run in unless the call names one
    working_dir: PathBuf,
    timeout: Duration,
}

impl ShellCommandTool {
    pub fn new(working_dir: PathBuf) -> Self {
        ShellCommandTool {
            working_dir,
            timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Set the per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn shell_command(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl Tool for ShellCommandTool {
    fn name(&self) -> &str {
        "execute_shell_command"
    }

    fn description(&self) -> &str {
        "Executes a command in the system's command-line shell and returns its status, return code, standard output and standard error. Useful for running scripts, builds, tests, or any other shell interaction."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command line to execute"
                },
                "working_directory": {
                    "type": "string",
                    "description": "Optional directory to run the command in"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let command = required_str(&args, "command")?;
        if command.trim().is_empty() {
            return Ok(ToolResult::failure("No command provided."));
        }

        let working_dir = optional_str(&args, "working_directory")
            .map(|dir| self.working_dir.join(dir))
            .unwrap_or_else(|| self.working_dir.clone());

        let mut cmd = Self::shell_command(command);
        cmd.current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Error executing command '{}': {}",
                    command, e
                )))
            }
        };

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = capture(child.stdout.take(), stdout.clone());
        let stderr_task = capture(child.stderr.take(), stderr.clone());

        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            status
        })
        .await;

        let report = match finished {
            Ok(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                debug!("Command exited with {}: {}", code, command);
                format_report(status.success(), code, &drain(&stdout), &drain(&stderr))
            }
            Ok(Err(e)) => {
                return Ok(ToolResult::failure(format!(
                    "Error executing command '{}': {}",
                    command, e
                )))
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", self.timeout, command);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out command: {}", e);
                }
                let mut partial_stderr = drain(&stderr);
                if !partial_stderr.trim().is_empty() {
                    partial_stderr.push('\n');
                }
                partial_stderr.push_str(&format!(
                    "Command timed out after {:?} and was terminated.",
                    self.timeout
                ));
                format_report(false, -1, &drain(&stdout), &partial_stderr)
            }
        };

        Ok(ToolResult::success(report))
    }
}

/// Copy a child pipe into `buffer` until EOF
fn capture<R>(reader: Option<R>, buffer: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

fn drain(buffer: &Mutex<Vec<u8>>) -> String {
    buffer
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// The `Status:` / `Return Code:` / stdout / stderr layout the agent reads
pub fn format_report(success: bool, code: i32, stdout: &str, stderr: &str) -> String {
    [
        format!("Status: {}", if success { "Success" } else { "Failure" }),
        format!("Return Code: {}", code),
        "--- stdout ---".to_string(),
        stdout.trim().to_string(),
        "--- stderr ---".to_string(),
        stderr.trim().to_string(),
    ]
    .join("\n")
}
