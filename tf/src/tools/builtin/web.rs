//! web_search and fetch_url tools - gated by the run's network permission

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tools::traits::require_str;
use crate::tools::{Tool, ToolContext, ToolError};

/// Fetch timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Response size cap before processing
const MAX_BODY_BYTES: usize = 1_000_000;

/// Search the web via a configured provider API
pub struct WebSearchTool;

/// Search API configuration, from environment
#[derive(Debug, Clone, Deserialize)]
struct SearchConfig {
    provider: String,
    api_key: String,
}

impl SearchConfig {
    fn from_env() -> Option<Self> {
        if let Ok(api_key) = std::env::var("TAVILY_API_KEY") {
            return Some(Self {
                provider: "tavily".to_string(),
                api_key,
            });
        }
        if let Ok(api_key) = std::env::var("BRAVE_API_KEY") {
            return Some(Self {
                provider: "brave".to_string(),
                api_key,
            });
        }
        None
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for information. Requires TAVILY_API_KEY or BRAVE_API_KEY."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum results to return (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        if !ctx.network_allowed {
            return Err(ToolError::NetworkDisabled);
        }
        let query = require_str(&input, "query")?;
        let max_results = input.get("max_results").and_then(Value::as_u64).unwrap_or(5) as usize;

        let config = SearchConfig::from_env().ok_or_else(|| {
            ToolError::InvalidArgument("no search provider configured (set TAVILY_API_KEY or BRAVE_API_KEY)".to_string())
        })?;

        debug!(%query, provider = %config.provider, "WebSearchTool: searching");
        match config.provider.as_str() {
            "tavily" => search_tavily(query, max_results, &config.api_key).await,
            "brave" => search_brave(query, max_results, &config.api_key).await,
            other => Err(ToolError::InvalidArgument(format!("unknown search provider: {}", other))),
        }
    }
}

async fn search_tavily(query: &str, max_results: usize, api_key: &str) -> Result<Value, ToolError> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let body = serde_json::json!({
        "api_key": api_key,
        "query": query,
        "max_results": max_results,
    });
    let response = client.post("https://api.tavily.com/search").json(&body).send().await?;
    if !response.status().is_success() {
        return Err(ToolError::Other(format!("search API error: {}", response.status())));
    }
    let json: Value = response.json().await?;
    let results = json.get("results").cloned().unwrap_or_else(|| Value::Array(vec![]));
    Ok(serde_json::json!({ "results": results }))
}

async fn search_brave(query: &str, max_results: usize, api_key: &str) -> Result<Value, ToolError> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let response = client
        .get("https://api.search.brave.com/res/v1/web/search")
        .query(&[("q", query), ("count", &max_results.to_string())])
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ToolError::Other(format!("search API error: {}", response.status())));
    }
    let json: Value = response.json().await?;
    let results = json
        .pointer("/web/results")
        .cloned()
        .unwrap_or_else(|| Value::Array(vec![]));
    Ok(serde_json::json!({ "results": results }))
}

/// Fetch a URL, converting HTML to markdown
pub struct FetchUrlTool;

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn description(&self) -> &'static str {
        "Fetch content from a URL. HTML is converted to markdown, JSON is pretty-printed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        if !ctx.network_allowed {
            return Err(ToolError::NetworkDisabled);
        }
        let url = require_str(&input, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArgument("URL must start with http:// or https://".to_string()));
        }

        debug!(%url, "FetchUrlTool: fetching");
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::Other(format!("HTTP error: {}", response.status())));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;
        if body.len() > MAX_BODY_BYTES {
            return Err(ToolError::Other(format!("response too large ({} bytes)", body.len())));
        }

        let output = if content_type.contains("text/html") || content_type.contains("application/xhtml") {
            html2md::rewrite_html(&body, false)
        } else if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
                Err(_) => body,
            }
        } else {
            body
        };

        let (content, truncated) = ctx.truncate_output(&output);
        let mut result = serde_json::json!({ "content": content, "content_type": content_type });
        if truncated {
            result["truncated"] = Value::Bool(true);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_web_search_network_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let err = WebSearchTool
            .execute(serde_json::json!({"query": "rust"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NetworkDisabled));
        assert_eq!(err.to_string(), "network disabled");
    }

    #[tokio::test]
    async fn test_fetch_url_network_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let err = FetchUrlTool
            .execute(serde_json::json!({"url": "https://example.com"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NetworkDisabled));
    }

    #[tokio::test]
    async fn test_fetch_url_rejects_non_http() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test").with_network(true);

        let err = FetchUrlTool
            .execute(serde_json::json!({"url": "file:///etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_fetch_url_missing_arg() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test").with_network(true);

        assert!(FetchUrlTool.execute(serde_json::json!({}), &ctx).await.is_err());
    }
}
