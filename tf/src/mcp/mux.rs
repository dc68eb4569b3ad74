//! MCP multiplexer - many sessions, one tool namespace

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{McpServerConfig, McpTransport};
use crate::llm::ToolDefinition;

use super::{McpError, McpSession, SseSession, StdioSession};

/// Prefix marking a tool as MCP-routed
pub const MCP_TOOL_PREFIX: &str = "mcp__";

/// Build the exposed name for a server tool
pub fn prefixed_tool_name(server: &str, tool: &str) -> String {
    format!("{}{}__{}", MCP_TOOL_PREFIX, server, tool)
}

/// Split an exposed name into (server, tool), None for non-MCP names
pub fn split_prefixed_name(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(MCP_TOOL_PREFIX)?.split_once("__")
}

struct SessionEntry {
    session: Arc<dyn McpSession>,
    call_timeout: Duration,
}

/// Routes prefixed tool calls to their owning MCP session
///
/// Opening is fail-fast: any session that cannot connect fails the whole
/// multiplexer. Closing is best-effort: individual close errors are logged
/// and swallowed so the owning pack always finishes closing.
pub struct McpMultiplexer {
    sessions: HashMap<String, SessionEntry>,
    tools: Vec<ToolDefinition>,
}

impl std::fmt::Debug for McpMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpMultiplexer")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("tools", &self.tools)
            .finish()
    }
}

impl McpMultiplexer {
    /// Connect all configured servers concurrently and cache their tools
    pub async fn open(configs: &[McpServerConfig]) -> Result<Self, McpError> {
        let mut seen = std::collections::HashSet::new();
        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(McpError::Protocol(format!("duplicate MCP server name: {}", config.name)));
            }
        }

        let connected = future::try_join_all(configs.iter().map(connect_session)).await?;

        let mut sessions = HashMap::new();
        let mut tools = Vec::new();
        let listings = future::try_join_all(connected.iter().map(|s| s.list_tools())).await?;
        for ((config, session), descriptors) in configs.iter().zip(connected.iter()).zip(listings) {
            for descriptor in descriptors {
                tools.push(ToolDefinition::new(
                    prefixed_tool_name(&config.name, &descriptor.name),
                    descriptor.description,
                    descriptor.input_schema,
                ));
            }
            sessions.insert(
                config.name.clone(),
                SessionEntry {
                    session: session.clone(),
                    call_timeout: Duration::from_millis(config.call_timeout_ms),
                },
            );
        }

        debug!(servers = sessions.len(), tools = tools.len(), "McpMultiplexer: opened");
        Ok(Self { sessions, tools })
    }

    /// Cached prefixed tool definitions
    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Does this multiplexer route the given exposed tool name?
    pub fn owns_tool(&self, name: &str) -> bool {
        split_prefixed_name(name).is_some_and(|(server, _)| self.sessions.contains_key(server))
    }

    /// Route a prefixed call to its session
    ///
    /// Timeouts and transport errors come back as Err without tearing the
    /// session down; only `close` ends sessions.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let (server, tool) = split_prefixed_name(name)
            .ok_or_else(|| McpError::Protocol(format!("not an MCP tool name: {}", name)))?;
        let entry = self
            .sessions
            .get(server)
            .ok_or_else(|| McpError::Protocol(format!("no MCP session named '{}'", server)))?;

        debug!(%server, %tool, "McpMultiplexer: routing call");
        entry.session.call_tool(tool, arguments, entry.call_timeout).await
    }

    /// Close all sessions concurrently; errors are logged, never propagated
    pub async fn close(&self) {
        let closes = self.sessions.values().map(|entry| {
            let session = entry.session.clone();
            async move {
                if let Err(e) = session.close().await {
                    warn!(server = session.name(), error = %e, "McpMultiplexer: session close failed");
                }
            }
        });
        future::join_all(closes).await;
    }
}

async fn connect_session(config: &McpServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
    match config.transport {
        McpTransport::Stdio => Ok(Arc::new(StdioSession::connect(config).await?)),
        McpTransport::Sse => Ok(Arc::new(SseSession::connect(config).await?)),
    }
}
