//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes the workspace: {reason}")]
    PathEscape { path: PathBuf, reason: String },

    #[error("Command '{command}' is not in the allowlist")]
    CommandNotAllowed { command: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("network disabled")]
    NetworkDisabled,

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl ToolError {
    /// Sandbox violations additionally emit a `security_event` audit record
    pub fn is_security_violation(&self) -> bool {
        matches!(self, ToolError::PathEscape { .. } | ToolError::CommandNotAllowed { .. })
    }

    /// Stable error type tag used in `tool_error` payloads
    pub fn error_type(&self) -> &'static str {
        match self {
            ToolError::PathEscape { .. } => "PathEscape",
            ToolError::CommandNotAllowed { .. } => "CommandNotAllowed",
            ToolError::InvalidArgument(_) => "InvalidArgument",
            ToolError::NetworkDisabled => "NetworkDisabled",
            ToolError::Timeout { .. } => "Timeout",
            ToolError::UnknownTool { .. } => "UnknownTool",
            ToolError::Io(_) => "Io",
            ToolError::Http(_) => "Http",
            ToolError::Other(_) => "Other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_violations() {
        let escape = ToolError::PathEscape {
            path: PathBuf::from("/etc/passwd"),
            reason: "outside workspace".to_string(),
        };
        assert!(escape.is_security_violation());
        assert_eq!(escape.error_type(), "PathEscape");

        let cmd = ToolError::CommandNotAllowed {
            command: "rm".to_string(),
        };
        assert!(cmd.is_security_violation());

        assert!(!ToolError::NetworkDisabled.is_security_violation());
        assert!(!ToolError::InvalidArgument("x".to_string()).is_security_violation());
    }

    #[test]
    fn test_path_escape_message() {
        let err = ToolError::PathEscape {
            path: PathBuf::from("/etc/passwd"),
            reason: "use a relative path".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/passwd"));
        assert!(msg.contains("use a relative path"));
    }

    #[test]
    fn test_network_disabled_message() {
        assert_eq!(ToolError::NetworkDisabled.to_string(), "network disabled");
    }
}
