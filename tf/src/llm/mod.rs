//! Chat client abstraction for TaskForce
//!
//! Provider-agnostic request/response types, the `ChatClient` trait the tool
//! loop drives, and the policy-driven local-to-cloud fallback wrapper. The
//! concrete HTTP backends (Ollama, vLLM, OpenAI-compatible) live outside the
//! core and implement `ChatClient`.

pub mod client;
mod error;
mod fallback;
mod openai;
mod types;

pub use client::ChatClient;
pub use error::LlmError;
pub use fallback::{FallbackChatClient, FallbackEvent, FallbackPolicy};
pub use openai::OpenAiCompatClient;
pub use types::{ChatRequest, ChatResponse, Message, Role, ToolCallRequest, ToolDefinition};
