//! cross_run_search tool - query the cross-run index

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::traits::require_str;
use crate::tools::{Tool, ToolContext, ToolError};

/// Search previous runs by prompt and finish summary
pub struct CrossRunSearchTool;

#[async_trait]
impl Tool for CrossRunSearchTool {
    fn name(&self) -> &'static str {
        "cross_run_search"
    }

    fn description(&self) -> &'static str {
        "Search previous runs by prompt and outcome. Returns run ids, prompts, and finish summaries."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum results (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = require_str(&input, "query")?;
        let top_k = input.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize;

        let index = ctx
            .run_index
            .as_ref()
            .ok_or_else(|| ToolError::InvalidArgument("cross-run index is not available".to_string()))?;

        debug!(%query, top_k, "CrossRunSearchTool: searching");
        let entries = index
            .search(query, top_k)
            .await
            .map_err(|e| ToolError::Other(format!("index search failed: {}", e)))?;

        let results: Vec<Value> = entries
            .into_iter()
            .map(|entry| {
                serde_json::json!({
                    "run_id": entry.run_id,
                    "specialist_ids": entry.specialist_ids,
                    "prompt_prefix": entry.prompt_prefix,
                    "finish_summary": entry.finish_summary,
                    "timestamp": entry.timestamp,
                })
            })
            .collect();
        Ok(serde_json::json!({ "results": results }))
    }
}
