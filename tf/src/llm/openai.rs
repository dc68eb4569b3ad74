//! OpenAI-compatible chat client
//!
//! Works against any Chat Completions endpoint (Ollama, vLLM, OpenAI) with
//! function-calling support. This is the default backend the binary wires
//! up; anything implementing [`ChatClient`] can replace it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChatClient, ChatRequest, ChatResponse, LlmError, Message, Role, ToolCallRequest};

/// Maximum retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Sleep applied to a 429 that carries no Retry-After header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Chat Completions API client
pub struct OpenAiCompatClient {
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
    timeout: Duration,
}

impl OpenAiCompatClient {
    /// Create a client; `api_key_env` names the env var holding the key
    /// (absent for keyless local endpoints like Ollama)
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key_env: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key_env.and_then(|var| std::env::var(var).ok());
        let timeout = Duration::from_millis(timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;
        Ok(Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            http,
            timeout,
        })
    }

    /// One request/response cycle, classified into [`LlmError`] for the
    /// retry loop
    async fn send_once(&self, url: &str, body: &Value) -> Result<ChatResponse, LlmError> {
        let mut req = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout)
            } else {
                LlmError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        if status == 200 {
            let api: ApiResponse = response.json().await?;
            return parse_response(api);
        }

        if status == 429 {
            let retry_after = parse_retry_after(response.headers()).unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(LlmError::RateLimited { retry_after });
        }

        let message = response.text().await.unwrap_or_default();
        Err(LlmError::ApiError { status, message })
    }

    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(convert_message).collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }
}

fn convert_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut value = serde_json::json!({ "role": role });
    if let Some(content) = &message.content {
        value["content"] = Value::String(content.clone());
    }
    if let Some(call_id) = &message.tool_call_id {
        value["tool_call_id"] = Value::String(call_id.clone());
    }
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.call_id,
                    "type": "function",
                    "function": {
                        "name": c.tool_name,
                        "arguments": c.arguments.to_string(),
                    }
                })
            })
            .collect();
        value["tool_calls"] = Value::Array(calls);
    }
    value
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

fn parse_response(api: ApiResponse) -> Result<ChatResponse, LlmError> {
    let choice = api
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response had no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| match serde_json::from_str::<Value>(&call.function.arguments) {
            Ok(arguments @ Value::Object(_)) => ToolCallRequest::new(call.id, call.function.name, arguments),
            // Argument parse failures surface as the {_raw} wrapper so the
            // loop and fallback policies can react
            _ => ToolCallRequest::parse_failed(call.id, call.function.name, call.function.arguments),
        })
        .collect();

    Ok(ChatResponse {
        content: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
    })
}

/// Parse a Retry-After header given in whole seconds
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut attempt = 0;
        loop {
            match self.send_once(&url, &body).await {
                Ok(response) => {
                    debug!(model = %request.model, "OpenAiCompatClient: response parsed");
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    // A server-sent Retry-After overrides our backoff
                    let delay = e.backoff_hint(backoff);
                    warn!(error = %e, attempt, ?delay, "OpenAiCompatClient: retrying");
                    tokio::time::sleep(delay).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
