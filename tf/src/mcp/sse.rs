//! SSE MCP transport - event stream for responses, POST channel for requests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::McpServerConfig;

use super::protocol::{JsonRpcRequest, JsonRpcResponse, initialize_params, parse_tool_list};
use super::{McpError, McpSession, McpToolDescriptor};

/// Handshake timeout
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// MCP session over Server-Sent-Events
///
/// A GET stream delivers responses; requests are POSTed to the endpoint the
/// server announces in its first `endpoint` event.
pub struct SseSession {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    pending: PendingMap,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl SseSession {
    /// Open the event stream and perform the MCP handshake
    pub async fn connect(config: &McpServerConfig) -> Result<Self, McpError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| McpError::Protocol("sse server config missing url".to_string()))?;

        debug!(server = %config.name, %url, "SseSession: opening stream");
        let stream = EventSource::get(url);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = tokio::spawn(reader_loop(config.name.clone(), stream, endpoint_tx, pending.clone()));

        let announced = tokio::time::timeout(HANDSHAKE_TIMEOUT, endpoint_rx)
            .await
            .map_err(|_| McpError::Timeout {
                timeout_ms: HANDSHAKE_TIMEOUT.as_millis() as u64,
            })?
            .map_err(|_| McpError::Protocol("stream closed before announcing an endpoint".to_string()))?;

        let session = Self {
            name: config.name.clone(),
            client: reqwest::Client::new(),
            endpoint: resolve_endpoint(url, &announced),
            pending,
            reader: std::sync::Mutex::new(Some(reader)),
            next_id: AtomicU64::new(1),
        };

        session.request("initialize", initialize_params(), HANDSHAKE_TIMEOUT).await?;
        session.notify("notifications/initialized").await?;
        debug!(server = %session.name, "SseSession: handshake complete");
        Ok(session)
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let posted = self.client.post(&self.endpoint).json(&request).send().await;
        if let Err(e) = posted {
            self.pending.lock().await.remove(&id);
            return Err(McpError::Http(e));
        }

        let timeout_ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout { timeout_ms })
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let request = JsonRpcRequest::notification(method);
        self.client.post(&self.endpoint).json(&request).send().await?;
        Ok(())
    }
}

async fn reader_loop(
    name: String,
    mut stream: EventSource,
    endpoint_tx: oneshot::Sender<String>,
    pending: PendingMap,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(message)) => {
                if message.event == "endpoint" {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(message.data);
                    }
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(&message.data) {
                    Ok(response) => {
                        if let Some(id) = response.id
                            && let Some(tx) = pending.lock().await.remove(&id)
                        {
                            let _ = tx.send(response);
                        }
                    }
                    Err(e) => warn!(server = %name, error = %e, "SseSession: unparseable message"),
                }
            }
            Err(e) => {
                warn!(server = %name, error = %e, "SseSession: stream error, closing");
                break;
            }
        }
    }
    // Dropping the pending map wakes outstanding callers with Closed
    pending.lock().await.clear();
}

/// Resolve a (possibly relative) announced endpoint against the stream URL
fn resolve_endpoint(base: &str, announced: &str) -> String {
    if announced.starts_with("http://") || announced.starts_with("https://") {
        return announced.to_string();
    }
    // scheme://host[:port]
    let origin_end = base
        .find("://")
        .map(|i| base[i + 3..].find('/').map(|j| i + 3 + j).unwrap_or(base.len()))
        .unwrap_or(base.len());
    let origin = &base[..origin_end];
    if announced.starts_with('/') {
        format!("{}{}", origin, announced)
    } else {
        format!("{}/{}", origin, announced)
    }
}

#[async_trait]
impl McpSession for SseSession {
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
        debug!(server = %self.name, "SseSession: closing");
        if let Some(reader) = self.reader.lock().expect("reader lock poisoned").take() {
            reader.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_endpoint() {
        assert_eq!(
            resolve_endpoint("http://localhost:8808/sse", "https://other/messages"),
            "https://other/messages"
        );
    }

    #[test]
    fn test_resolve_relative_endpoint() {
        assert_eq!(
            resolve_endpoint("http://localhost:8808/sse", "/messages?id=7"),
            "http://localhost:8808/messages?id=7"
        );
        assert_eq!(
            resolve_endpoint("https://host/sse/stream", "messages"),
            "https://host/messages"
        );
    }
}
