//! Model-Context-Protocol multiplexer
//!
//! Aggregates tools from external MCP servers (stdio subprocess or SSE
//! transport) under one pack. Every server tool is exposed to the model as
//! `mcp__<server>__<tool>`; calls are routed back to the owning session by
//! stripping the prefix.

mod mux;
mod protocol;
mod session;
mod sse;
mod stdio;

pub use mux::{McpMultiplexer, prefixed_tool_name, split_prefixed_name};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpError, McpToolDescriptor};
pub use session::McpSession;
pub use sse::SseSession;
pub use stdio::StdioSession;
