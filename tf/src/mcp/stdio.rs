//! stdio MCP transport - line-delimited JSON-RPC over a subprocess

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::McpServerConfig;

use super::protocol::{JsonRpcRequest, JsonRpcResponse, initialize_params, parse_tool_list};
use super::{McpError, McpSession, McpToolDescriptor};

/// Handshake timeout
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

struct StdioChannel {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// MCP session over a spawned subprocess
///
/// Requests and responses are serialized lock-step through one mutex: MCP
/// calls within a session are sequential, which keeps the reader trivial.
pub struct StdioSession {
    name: String,
    channel: Mutex<StdioChannel>,
    child: Mutex<Child>,
    next_id: AtomicU64,
}

impl StdioSession {
    /// Spawn the server process and perform the MCP handshake
    pub async fn connect(config: &McpServerConfig) -> Result<Self, McpError> {
        let command = config
            .command
            .as_deref()
            .ok_or_else(|| McpError::Protocol("stdio server config missing command".to_string()))?;

        debug!(server = %config.name, %command, "StdioSession: spawning");
        let mut child = Command::new(command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout unavailable".to_string()))?;

        let session = Self {
            name: config.name.clone(),
            channel: Mutex::new(StdioChannel {
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
        };

        session.request("initialize", initialize_params(), HANDSHAKE_TIMEOUT).await?;
        session.notify("notifications/initialized").await?;
        debug!(server = %session.name, "StdioSession: handshake complete");
        Ok(session)
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request)?;

        let timeout_ms = timeout.as_millis() as u64;
        let mut channel = self.channel.lock().await;
        tokio::time::timeout(timeout, async {
            channel.stdin.write_all(line.as_bytes()).await?;
            channel.stdin.write_all(b"\n").await?;
            channel.stdin.flush().await?;

            // Skip notifications and stray lines until our id answers
            loop {
                let line = channel
                    .stdout
                    .next_line()
                    .await?
                    .ok_or(McpError::Closed)?;
                let response: JsonRpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(server = %self.name, error = %e, "StdioSession: unparseable line, skipping");
                        continue;
                    }
                };
                if response.id == Some(id) {
                    return response.into_result();
                }
            }
        })
        .await
        .map_err(|_| McpError::Timeout { timeout_ms })?
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let request = JsonRpcRequest::notification(method);
        let line = serde_json::to_string(&request)?;
        let mut channel = self.channel.lock().await;
        channel.stdin.write_all(line.as_bytes()).await?;
        channel.stdin.write_all(b"\n").await?;
        channel.stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl McpSession for StdioSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        let result = self
            .request("tools/list", serde_json::json!({}), HANDSHAKE_TIMEOUT)
            .await?;
        parse_tool_list(&result)
    }

    async fn call_tool(&self, tool: &str, arguments: Value, timeout: Duration) -> Result<Value, McpError> {
        self.request(
            "tools/call",
            serde_json::json!({ "name": tool, "arguments": arguments }),
            timeout,
        )
        .await
    }

    async fn close(&self) -> Result<(), McpError> {
        debug!(server = %self.name, "StdioSession: closing");
        let mut child = self.child.lock().await;
        child.kill().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpTransport;

    /// A canned MCP responder written in shell: answers the handshake,
    /// tools/list, and one tools/call, in protocol order.
    fn fake_server_config(name: &str) -> McpServerConfig {
        let script = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) : ;;
    *'"method":"initialize"'*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05"}}' ;;
    *tools/list*) echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo input","inputSchema":{"type":"object"}}]}}' ;;
    *tools/call*) echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"hello from mcp"}]}}' ;;
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
    async fn test_stdio_handshake_and_list() {
        let session = StdioSession::connect(&fake_server_config("fake")).await.unwrap();
        assert_eq!(session.name(), "fake");

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stdio_call_tool() {
        let session = StdioSession::connect(&fake_server_config("fake")).await.unwrap();

        let result = session
            .call_tool("echo", serde_json::json!({"text": "hi"}), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result["content"][0]["text"].as_str().unwrap().contains("hello from mcp"));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stdio_call_timeout_keeps_session() {
        // Responds to the handshake and list, then goes silent
        let script = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) : ;;
    *'"method":"initialize"'*) echo '{"jsonrpc":"2.0","id":1,"result":{}}' ;;
    *tools/list*) echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}' ;;
    *tools/call*) : ;;
  esac
done
"#;
        let config = McpServerConfig {
            name: "silent".to_string(),
            transport: McpTransport::Stdio,
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        };

        let session = StdioSession::connect(&config).await.unwrap();
        let err = session
            .call_tool("echo", serde_json::json!({}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));

        // The session is still alive for other operations
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stdio_spawn_failure() {
        let config = McpServerConfig {
            name: "broken".to_string(),
            transport: McpTransport::Stdio,
            command: Some("/definitely/not/a/command".to_string()),
            ..Default::default()
        };
        assert!(StdioSession::connect(&config).await.is_err());
    }
}
