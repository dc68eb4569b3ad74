//! MCP session trait

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{McpError, McpToolDescriptor};

/// One live connection to an MCP server
///
/// A session is opened (handshake included) by its transport's constructor,
/// owned by exactly one pack, and closed when the pack closes. A failed call
/// must leave the session usable; only `close` tears it down.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Server name from config (the tool-name prefix)
    fn name(&self) -> &str;

    /// Tools advertised by the server
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError>;

    /// Invoke a tool with a per-call timeout
    async fn call_tool(&self, tool: &str, arguments: Value, timeout: Duration) -> Result<Value, McpError>;

    /// Terminate the session
    async fn close(&self) -> Result<(), McpError>;
}
