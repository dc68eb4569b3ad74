//! LLM error types
//!
//! The retry classification here drives the backend client's retry loop:
//! `is_retryable` decides whether to try again, and `backoff_hint` prefers a
//! server-specified `Retry-After` over the caller's exponential backoff.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during chat operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited by the backend, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("backend returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether replaying the same request can help
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Timeout(_) => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            LlmError::Network(e) => e.is_timeout() || e.is_connect(),
            LlmError::InvalidResponse(_) | LlmError::Json(_) => false,
        }
    }

    /// Server-specified wait before retrying, when the backend sent one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Delay the retry loop should sleep: the server's `Retry-After` when
    /// present, the caller's backoff otherwise
    pub fn backoff_hint(&self, fallback: Duration) -> Duration {
        self.retry_after().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_retryable_with_server_delay() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(7),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        // Server delay wins over the caller's backoff
        assert_eq!(err.backoff_hint(Duration::from_secs(1)), Duration::from_secs(7));
    }

    #[test]
    fn test_api_status_classification() {
        let transient = LlmError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(transient.is_retryable());
        assert_eq!(transient.backoff_hint(Duration::from_secs(2)), Duration::from_secs(2));

        let permanent = LlmError::ApiError {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.retry_after(), None);
    }

    #[test]
    fn test_timeout_retries_on_backoff() {
        let err = LlmError::Timeout(Duration::from_secs(30));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), None);
        assert_eq!(err.backoff_hint(Duration::from_millis(500)), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_failures_are_not_retryable() {
        assert!(!LlmError::InvalidResponse("empty choices".to_string()).is_retryable());
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(!LlmError::Json(json_err).is_retryable());
    }
}
