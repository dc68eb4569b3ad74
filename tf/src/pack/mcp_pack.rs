//! MCP-augmented pack wrapper

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::McpServerConfig;
use crate::llm::ToolDefinition;
use crate::mcp::{McpError, McpMultiplexer, split_prefixed_name};
use crate::tools::ToolError;

use super::traits::SpecialistPack;

/// Wraps an inner pack with tools multiplexed from MCP servers
///
/// Session lifecycle is tied to the pack: `open` connects every configured
/// server (fail-fast), `close` tears them all down (best-effort) and always
/// also closes the inner pack.
pub struct McpPack {
    inner: Box<dyn SpecialistPack>,
    configs: Vec<McpServerConfig>,
    mux: Mutex<Option<McpMultiplexer>>,
    cached_defs: StdMutex<Vec<ToolDefinition>>,
}

impl McpPack {
    pub fn new(inner: Box<dyn SpecialistPack>, configs: Vec<McpServerConfig>) -> Self {
        Self {
            inner,
            configs,
            mux: Mutex::new(None),
            cached_defs: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SpecialistPack for McpPack {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn system_prompt(&self) -> String {
        self.inner.system_prompt()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.inner.tool_definitions();
        defs.extend(self.cached_defs.lock().expect("defs lock poisoned").iter().cloned());
        defs
    }

    fn required_finish_fields(&self) -> Vec<String> {
        self.inner.required_finish_fields()
    }

    fn validate_finish(&self, payload: &Value) -> Result<(), String> {
        self.inner.validate_finish(payload)
    }

    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        if split_prefixed_name(name).is_some() {
            let guard = self.mux.lock().await;
            let mux = guard
                .as_ref()
                .ok_or_else(|| ToolError::Other("MCP sessions are not open".to_string()))?;
            return mux.execute(name, arguments).await.map_err(mcp_to_tool_error);
        }
        self.inner.execute_tool(name, arguments).await
    }

    async fn open(&self) -> eyre::Result<()> {
        self.inner.open().await?;
        debug!(pack = self.inner.id(), servers = self.configs.len(), "McpPack: opening sessions");
        let mux = McpMultiplexer::open(&self.configs).await?;
        *self.cached_defs.lock().expect("defs lock poisoned") = mux.tool_definitions().to_vec();
        *self.mux.lock().await = Some(mux);
        Ok(())
    }

    async fn close(&self) -> eyre::Result<()> {
        if let Some(mux) = self.mux.lock().await.take() {
            mux.close().await;
        }
        self.inner.close().await
    }
}

fn mcp_to_tool_error(error: McpError) -> ToolError {
    match error {
        McpError::Timeout { timeout_ms } => ToolError::Timeout { timeout_ms },
        other => ToolError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpTransport;
    use crate::pack::FINISH_TOOL;

    /// Minimal inner pack for wrapper tests
    struct StubPack;

    #[async_trait]
    impl SpecialistPack for StubPack {
        fn id(&self) -> &str {
            "stub"
        }

        fn system_prompt(&self) -> String {
            "stub prompt".to_string()
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new(FINISH_TOOL, "finish", serde_json::json!({}))]
        }

        fn required_finish_fields(&self) -> Vec<String> {
            vec!["summary".to_string()]
        }

        async fn execute_tool(&self, name: &str, _arguments: Value) -> Result<Value, ToolError> {
            Ok(serde_json::json!({ "inner_tool": name }))
        }
    }

    fn fake_server(name: &str) -> McpServerConfig {
        let script = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) : ;;
    *'"method":"initialize"'*) echo '{"jsonrpc":"2.0","id":1,"result":{}}' ;;
    *tools/list*) echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"remember","description":"Store a note","inputSchema":{"type":"object"}}]}}' ;;
    *tools/call*) echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"stored"}]}}' ;;
  esac
done
"#;
        McpServerConfig {
            name: name.to_string(),
            transport: McpTransport::Stdio,
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mcp_pack_merges_tool_definitions() {
        let pack = McpPack::new(Box::new(StubPack), vec![fake_server("memory")]);

        // Before open only the inner tools are visible
        assert_eq!(pack.tool_definitions().len(), 1);

        pack.open().await.unwrap();
        let names: Vec<String> = pack.tool_definitions().iter().map(|d| d.name.clone()).collect();
        assert!(names.contains(&FINISH_TOOL.to_string()));
        assert!(names.contains(&"mcp__memory__remember".to_string()));

        pack.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mcp_pack_routes_by_prefix() {
        let pack = McpPack::new(Box::new(StubPack), vec![fake_server("memory")]);
        pack.open().await.unwrap();

        let mcp_result = pack
            .execute_tool("mcp__memory__remember", serde_json::json!({"note": "x"}))
            .await
            .unwrap();
        assert!(mcp_result["content"][0]["text"].as_str().unwrap().contains("stored"));

        let inner_result = pack.execute_tool("read_file", serde_json::json!({})).await.unwrap();
        assert_eq!(inner_result["inner_tool"], "read_file");

        pack.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mcp_pack_call_before_open_fails() {
        let pack = McpPack::new(Box::new(StubPack), vec![fake_server("memory")]);
        let err = pack
            .execute_tool("mcp__memory__remember", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not open"));
    }

    #[tokio::test]
    async fn test_mcp_pack_open_fail_fast() {
        let bad = McpServerConfig {
            name: "broken".to_string(),
            transport: McpTransport::Stdio,
            command: Some("/definitely/not/a/command".to_string()),
            ..Default::default()
        };
        let pack = McpPack::new(Box::new(StubPack), vec![bad]);
        assert!(pack.open().await.is_err());
    }

    #[tokio::test]
    async fn test_mcp_pack_close_is_idempotent() {
        let pack = McpPack::new(Box::new(StubPack), vec![fake_server("memory")]);
        pack.open().await.unwrap();
        pack.close().await.unwrap();
        pack.close().await.unwrap();
    }
}
