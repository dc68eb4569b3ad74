//! write_file tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::traits::require_str;
use crate::tools::{Tool, ToolContext, ToolError};

/// Write content to a file inside the workspace
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed. Path is relative to the workspace root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = require_str(&input, "path")?;
        let content = require_str(&input, "content")?;

        let full_path = ctx.resolve_path_for_write(path)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        debug!(%path, bytes = content.len(), "WriteFileTool: wrote file");
        Ok(serde_json::json!({ "ok": true, "bytes": content.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_file_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "hello.txt", "content": "Hello"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
        assert_eq!(fs::read_to_string(temp.path().join("hello.txt")).unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        WriteFileTool
            .execute(serde_json::json!({"path": "x.txt", "content": "round trip"}), &ctx)
            .await
            .unwrap();
        let result = super::super::ReadFileTool
            .execute(serde_json::json!({"path": "x.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["content"], "round trip");
    }

    #[tokio::test]
    async fn test_write_file_creates_directories() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        WriteFileTool
            .execute(
                serde_json::json!({"path": "nested/dir/test.txt", "content": "content"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("nested/dir/test.txt")).unwrap(),
            "content"
        );
    }

    #[tokio::test]
    async fn test_write_file_overwrites() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("t.txt"), "old").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        WriteFileTool
            .execute(serde_json::json!({"path": "t.txt", "content": "new"}), &ctx)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("t.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_write_file_missing_content() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let err = WriteFileTool
            .execute(serde_json::json!({"path": "t.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content is required"));
    }

    #[tokio::test]
    async fn test_write_file_absolute_path_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let err = WriteFileTool
            .execute(serde_json::json!({"path": "/etc/passwd", "content": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.is_security_violation());
    }

    #[tokio::test]
    async fn test_write_file_workspace_root_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        assert!(
            WriteFileTool
                .execute(serde_json::json!({"path": "", "content": "x"}), &ctx)
                .await
                .is_err()
        );
    }
}
