//! Line-delimited JSON-RPC types for MCP

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// MCP protocol version sent during the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors from MCP transports and sessions
#[derive(Debug, Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Session closed")]
    Closed,
}

/// One JSON-RPC request (or notification, when `id` is None)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params: None,
        }
    }
}

/// One JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Unwrap into the result value or a server error
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(error) = self.error {
            return Err(McpError::Server {
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or_else(|| McpError::Protocol("response had neither result nor error".to_string()))
    }
}

/// A tool advertised by an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Parse a `tools/list` result into descriptors
pub fn parse_tool_list(result: &Value) -> Result<Vec<McpToolDescriptor>, McpError> {
    let tools = result
        .get("tools")
        .ok_or_else(|| McpError::Protocol("tools/list result missing 'tools'".to_string()))?;
    serde_json::from_value(tools.clone()).map_err(McpError::from)
}

/// Initialize-request params for the handshake
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": { "name": "taskforce", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": {},
    })
}
