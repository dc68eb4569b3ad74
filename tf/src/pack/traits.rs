//! SpecialistPack trait definition

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDefinition;
use crate::tools::ToolError;

/// Name of the terminal tool that ends a specialist's loop
pub const FINISH_TOOL: &str = "finish_task";

/// A stateless capability bundle for one specialist role
///
/// Packs are instantiated per specialist per run and owned by the tool-loop
/// invocation that opened them; `close` must run on every exit path.
#[async_trait]
pub trait SpecialistPack: Send + Sync {
    /// Stable pack id (e.g. "engineering")
    fn id(&self) -> &str;

    /// System prompt seeding the specialist's conversation
    fn system_prompt(&self) -> String;

    /// All callable tool definitions, including `finish_task`
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Fields every accepted `finish_task` payload must contain
    fn required_finish_fields(&self) -> Vec<String>;

    /// Pack-specific finish gate; Err loops the message back to the model
    fn validate_finish(&self, _payload: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Dispatch a (non-finish) tool call
    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;

    /// Acquire external resources (MCP sessions, containers)
    async fn open(&self) -> eyre::Result<()> {
        Ok(())
    }

    /// Release external resources; runs on success, error, and cancel paths
    async fn close(&self) -> eyre::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn SpecialistPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistPack").field("id", &self.id()).finish()
    }
}

/// Build the `finish_task` tool definition for a pack's required fields
pub fn finish_task_definition(required_fields: &[String]) -> ToolDefinition {
    let mut properties = serde_json::Map::new();
    for field in required_fields {
        let schema = match field.as_str() {
            "tests_verified" => serde_json::json!({
                "type": "boolean",
                "description": "Whether the test suite was run and passed"
            }),
            "files_changed" => serde_json::json!({
                "type": "array",
                "items": { "type": "string" },
                "description": "Workspace-relative paths of files created or modified"
            }),
            other => serde_json::json!({
                "type": "string",
                "description": format!("The {} of the completed work", other.replace('_', " "))
            }),
        };
        properties.insert(field.clone(), schema);
    }

    ToolDefinition::new(
        FINISH_TOOL,
        "Finish the task. Call this exactly once, after your other tool calls, with the final results.",
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required_fields,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_definition_lists_required_fields() {
        let fields = vec![
            "summary".to_string(),
            "files_changed".to_string(),
            "tests_verified".to_string(),
        ];
        let def = finish_task_definition(&fields);
        assert_eq!(def.name, FINISH_TOOL);
        assert_eq!(def.input_schema["required"], serde_json::json!(fields));
        assert_eq!(def.input_schema["properties"]["tests_verified"]["type"], "boolean");
        assert_eq!(def.input_schema["properties"]["files_changed"]["type"], "array");
        assert_eq!(def.input_schema["properties"]["summary"]["type"], "string");
    }
}
