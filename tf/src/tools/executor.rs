//! ToolExecutor - named tool registry for one pack

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::llm::ToolDefinition;

use super::builtin::{
    CrossRunSearchTool, FetchUrlTool, ListFilesTool, ReadFileTool, RunTestsTool, ShellTool, WebSearchTool,
    WriteFileTool,
};
use super::{Tool, ToolContext, ToolError};

/// Maps tool names to implementations for one specialist pack
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create an executor holding every builtin tool
    pub fn standard() -> Self {
        let mut executor = Self::empty();
        executor.add_tool(Box::new(ReadFileTool));
        executor.add_tool(Box::new(WriteFileTool));
        executor.add_tool(Box::new(ListFilesTool));
        executor.add_tool(Box::new(ShellTool));
        executor.add_tool(Box::new(RunTestsTool));
        executor.add_tool(Box::new(WebSearchTool));
        executor.add_tool(Box::new(FetchUrlTool));
        executor.add_tool(Box::new(CrossRunSearchTool));
        executor
    }

    /// Create an executor with only the named builtin tools
    ///
    /// Unknown names are skipped with a warning: pack configs may reference
    /// tools from newer builds.
    pub fn for_tools(names: &[String]) -> Self {
        let mut all = Self::standard();
        let mut subset = Self::empty();
        for name in names {
            match all.tools.remove(name) {
                Some(tool) => {
                    subset.tools.insert(name.clone(), tool);
                }
                None => tracing::warn!(%name, "ToolExecutor: unknown builtin tool in config, skipping"),
            }
        }
        subset
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the executor
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool definitions for the LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        debug!(tool = %name, "ToolExecutor: dispatching");
        match self.tools.get(name) {
            Some(tool) => tool.execute(input, ctx).await,
            None => Err(ToolError::UnknownTool { name: name.to_string() }),
        }
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_standard_executor_has_builtins() {
        let executor = ToolExecutor::standard();
        for name in [
            "read_file",
            "write_file",
            "list_files",
            "shell",
            "run_tests",
            "web_search",
            "fetch_url",
            "cross_run_search",
        ] {
            assert!(executor.has_tool(name), "missing builtin {}", name);
        }
    }

    #[test]
    fn test_for_tools_subset() {
        let executor = ToolExecutor::for_tools(&["read_file".to_string(), "write_file".to_string()]);
        assert!(executor.has_tool("read_file"));
        assert!(executor.has_tool("write_file"));
        assert!(!executor.has_tool("shell"));
        assert_eq!(executor.definitions().len(), 2);
    }

    #[test]
    fn test_for_tools_skips_unknown_names() {
        let executor = ToolExecutor::for_tools(&["read_file".to_string(), "teleport".to_string()]);
        assert_eq!(executor.tool_names(), vec!["read_file"]);
    }

    #[test]
    fn test_definitions_are_sorted() {
        let executor = ToolExecutor::standard();
        let defs = executor.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let executor = ToolExecutor::standard();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let err = executor
            .execute("unknown_tool", serde_json::json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }));
    }
}
