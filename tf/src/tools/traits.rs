//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolContext, ToolError};

/// A tool callable by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the tool-call name the model emits)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    ///
    /// Ok holds the result object appended to the conversation; Err is
    /// classified by the tool loop (logged, audited for sandbox violations,
    /// and surfaced to the model as an error result).
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Pull a required string argument out of a tool input object
pub(crate) fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgument(format!("{} is required", key)))
}
