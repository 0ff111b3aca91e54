//! Shell command execution tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::error::required_str;
use super::{truncate_output, Tool, ToolContext, ToolError};

const COMMAND_TIMEOUT_SECS: u64 = 30;
const OUTPUT_LIMIT: usize = 5_000;

/// Run a shell command.
pub struct RunCommand;

#[async_trait]
impl Tool for RunCommand {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command (cmd on Windows, sh elsewhere) and return its output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let command = required_str(args, "command")?;

        tracing::debug!("Executing command: {}", command);

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let run = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS), run).await
        {
            Ok(result) => result.map_err(|e| ToolError::io("Command error", e))?,
            Err(_) => return Ok("Timeout.".to_string()),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if combined.is_empty() {
            return Ok("Done (no output).".to_string());
        }

        Ok(truncate_output(&combined, OUTPUT_LIMIT))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn stdout_and_stderr_are_combined() {
        let out = RunCommand
            .execute(&json!({"command": "echo out; echo err 1>&2"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out, "out\nerr\n");
    }

    #[tokio::test]
    async fn silent_command_reports_done() {
        let out = RunCommand
            .execute(&json!({"command": "true"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out, "Done (no output).");
    }

    #[tokio::test]
    async fn missing_command_argument() {
        let err = RunCommand.execute(&json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingField(f) if f == "command"));
    }
}
