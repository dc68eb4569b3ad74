//! list_files tool

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolError};

/// Maximum entries returned per listing
const MAX_ENTRIES: usize = 500;

/// List files under the workspace (or a subpath), recursively
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> &'static str {
        "List files under the workspace, or under an optional relative subpath. Directories end with '/'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Optional subpath relative to the workspace"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let subpath = input.get("path").and_then(Value::as_str).unwrap_or("");
        let root = ctx.resolve_path(subpath)?;

        if !root.exists() {
            return Err(ToolError::InvalidArgument(format!("path does not exist: {}", subpath)));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let mut name = relative.display().to_string();
            if entry.file_type().is_dir() {
                name.push('/');
            }
            entries.push(Value::String(name));
            if entries.len() >= MAX_ENTRIES {
                break;
            }
        }

        Ok(serde_json::json!({ "entries": entries }))
    }
}
