//! Policy-driven local-to-cloud chat escalation
//!
//! Wraps a "local" client and a "cloud" client. The local client is always
//! called first; when the configured policy judges its response insufficient,
//! the same request is replayed against the cloud client. Escalations are
//! recorded as queued events which the tool loop drains into the runlog.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::FallbackPolicyConfig;

use super::{ChatClient, ChatRequest, ChatResponse, LlmError};

/// Escalation trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Local response has zero tool calls and non-empty content
    NoToolCalls,
    /// Local response has at least one tool call with unparseable arguments
    MalformedArgs,
    /// Always call both, prefer the cloud result
    Always,
}

impl FallbackPolicy {
    /// Map from the config representation; `Off` yields no policy
    pub fn from_config(config: FallbackPolicyConfig) -> Option<Self> {
        match config {
            FallbackPolicyConfig::Off => None,
            FallbackPolicyConfig::NoToolCalls => Some(Self::NoToolCalls),
            FallbackPolicyConfig::MalformedArgs => Some(Self::MalformedArgs),
            FallbackPolicyConfig::Always => Some(Self::Always),
        }
    }

    /// Does this local response trigger escalation?
    fn triggered_by(&self, response: &ChatResponse) -> bool {
        match self {
            Self::NoToolCalls => {
                response.tool_calls.is_empty() && response.content.as_deref().is_some_and(|c| !c.is_empty())
            }
            Self::MalformedArgs => response.tool_calls.iter().any(|c| c.is_parse_failed()),
            Self::Always => true,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::NoToolCalls => "no_tool_calls",
            Self::MalformedArgs => "malformed_args",
            Self::Always => "always",
        }
    }
}

/// One recorded escalation, drained into the runlog as a `cloud_fallback` event
#[derive(Debug, Clone, Serialize)]
pub struct FallbackEvent {
    pub reason: String,
    pub local_model: String,
    pub cloud_model: String,
}

/// Chat client that escalates from local to cloud per policy
pub struct FallbackChatClient {
    local: Arc<dyn ChatClient>,
    cloud: Arc<dyn ChatClient>,
    policy: FallbackPolicy,
    pending: Mutex<Vec<FallbackEvent>>,
}

impl FallbackChatClient {
    pub fn new(local: Arc<dyn ChatClient>, cloud: Arc<dyn ChatClient>, policy: FallbackPolicy) -> Self {
        Self {
            local,
            cloud,
            policy,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Take all queued fallback events (single reader: the owning tool loop)
    pub async fn drain_events(&self) -> Vec<FallbackEvent> {
        std::mem::take(&mut *self.pending.lock().await)
    }
}

#[async_trait]
impl ChatClient for FallbackChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let local_response = self.local.chat(request.clone()).await?;

        if !self.policy.triggered_by(&local_response) {
            return Ok(local_response);
        }

        debug!(reason = self.policy.reason(), "FallbackChatClient: escalating to cloud");
        match self.cloud.chat(request).await {
            Ok(cloud_response) => {
                self.pending.lock().await.push(FallbackEvent {
                    reason: self.policy.reason().to_string(),
                    local_model: self.local.model().to_string(),
                    cloud_model: self.cloud.model().to_string(),
                });
                Ok(cloud_response)
            }
            Err(e) => {
                // Cloud unavailable: the local response stands, no event
                warn!(error = %e, "FallbackChatClient: cloud call failed, keeping local response");
                Ok(local_response)
            }
        }
    }

    fn model(&self) -> &str {
        self.local.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{FailingChatClient, MockChatClient};
    use crate::llm::{Message, ToolCallRequest};

    fn request() -> ChatRequest {
        ChatRequest::new(vec![Message::user("hi")], "m", vec![])
    }

    #[tokio::test]
    async fn test_no_escalation_when_local_has_tool_calls() {
        let call = ToolCallRequest::new("c1", "read_file", serde_json::json!({"path": "a"}));
        let local = Arc::new(MockChatClient::new(vec![ChatResponse::calls(vec![call])]).with_model("local"));
        let cloud = Arc::new(MockChatClient::new(vec![ChatResponse::text("cloud")]).with_model("cloud"));
        let client = FallbackChatClient::new(local, cloud.clone(), FallbackPolicy::NoToolCalls);

        let response = client.chat(request()).await.unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(cloud.call_count(), 0);
        assert!(client.drain_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_escalates_on_plain_text() {
        let local = Arc::new(MockChatClient::new(vec![ChatResponse::text("just chatting")]).with_model("local"));
        let cloud_call = ToolCallRequest::new("c1", "write_file", serde_json::json!({}));
        let cloud = Arc::new(MockChatClient::new(vec![ChatResponse::calls(vec![cloud_call])]).with_model("cloud"));
        let client = FallbackChatClient::new(local, cloud, FallbackPolicy::NoToolCalls);

        let response = client.chat(request()).await.unwrap();
        assert_eq!(response.tool_calls.len(), 1);

        let events = client.drain_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "no_tool_calls");
        assert_eq!(events[0].local_model, "local");
        assert_eq!(events[0].cloud_model, "cloud");

        // Drained queue stays empty
        assert!(client.drain_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_escalates_on_malformed_args() {
        let bad_call = ToolCallRequest::parse_failed("c1", "write_file", "{{nope");
        let local = Arc::new(MockChatClient::new(vec![ChatResponse::calls(vec![bad_call])]));
        let cloud = Arc::new(MockChatClient::new(vec![ChatResponse::text("fixed")]));
        let client = FallbackChatClient::new(local, cloud, FallbackPolicy::MalformedArgs);

        let response = client.chat(request()).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("fixed"));
        assert_eq!(client.drain_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cloud_failure_returns_local_without_event() {
        let local = Arc::new(MockChatClient::new(vec![ChatResponse::text("local answer")]));
        let cloud = Arc::new(FailingChatClient);
        let client = FallbackChatClient::new(local, cloud, FallbackPolicy::Always);

        let response = client.chat(request()).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("local answer"));
        assert!(client.drain_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_always_prefers_cloud() {
        let local = Arc::new(MockChatClient::new(vec![ChatResponse::text("local")]));
        let cloud = Arc::new(MockChatClient::new(vec![ChatResponse::text("cloud")]));
        let client = FallbackChatClient::new(local, cloud, FallbackPolicy::Always);

        let response = client.chat(request()).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("cloud"));
        assert_eq!(client.drain_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_local_transport_error_propagates() {
        let client = FallbackChatClient::new(
            Arc::new(FailingChatClient),
            Arc::new(MockChatClient::new(vec![ChatResponse::text("cloud")])),
            FallbackPolicy::Always,
        );
        assert!(client.chat(request()).await.is_err());
    }
}
