//! read_file tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::traits::require_str;
use crate::tools::{Tool, ToolContext, ToolError};

/// Read a file from the workspace
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file from the workspace. Path is relative to the workspace root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = require_str(&input, "path")?;
        let full_path = ctx.resolve_path(path)?;

        debug!(%path, "ReadFileTool: reading");
        let content = tokio::fs::read_to_string(&full_path).await?;
        let (content, truncated) = ctx.truncate_output(&content);

        let mut result = serde_json::json!({ "content": content });
        if truncated {
            result["truncated"] = Value::Bool(true);
        }
        Ok(result)
    }
}
