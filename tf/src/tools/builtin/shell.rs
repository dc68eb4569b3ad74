//! shell tool - allowlisted command execution

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tools::traits::require_str;
use crate::tools::{Tool, ToolContext, ToolError};

/// Execute an allowlisted shell command with cwd = workspace root
///
/// The allowlist gates the command's first token only; arguments are not
/// inspected (file-tool paths are where the sandbox constrains file access).
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the workspace. Only allowlisted commands (python, pytest, cargo, npm, git, ...) may run."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let command = require_str(&input, "command")?;
        ctx.check_command(command)?;

        let timeout_ms = input
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(ctx.config.shell_timeout_ms);

        debug!(%command, timeout_ms, "ShellTool: spawning");
        let output = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.workspace)
                .output(),
        )
        .await
        .map_err(|_| ToolError::Timeout { timeout_ms })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        // The byte cap applies to stdout and stderr combined
        let cap = ctx.config.output_byte_cap;
        let total = stdout.len() + stderr.len();
        let truncated = total > cap;
        let (stdout, stderr) = if truncated {
            let stdout_budget = cap.min(stdout.len());
            let stderr_budget = cap - stdout_budget;
            let (out, _) = ctx.truncate_output(&stdout[..floor_char_boundary(&stdout, stdout_budget)]);
            let (err, _) = ctx.truncate_output(&stderr[..floor_char_boundary(&stderr, stderr_budget)]);
            (out, err)
        } else {
            (stdout.to_string(), stderr.to_string())
        };

        let mut result = serde_json::json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
        });
        if truncated {
            result["truncated"] = Value::Bool(true);
            result["total_bytes"] = Value::from(total);
        }
        Ok(result)
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
