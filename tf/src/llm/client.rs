//! ChatClient trait definition

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, LlmError};

/// Stateless chat client - each call is independent
///
/// The tool loop re-sends the full message array on every call, so no
/// conversation state lives in the client. Backends (Ollama, vLLM,
/// OpenAI-compatible HTTP) implement this trait outside the core.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send one chat call with callable tools and return the model's turn
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Model identifier this client calls, for fallback event payloads
    fn model(&self) -> &str;
}
