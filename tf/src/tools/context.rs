//! ToolContext - sandboxed execution context for tools
//!
//! Every file-path argument resolves through the same policy: absolute paths
//! are rejected outright, relative paths are joined onto the workspace root,
//! canonicalized, and asserted to stay under the canonical root. The shell
//! tool additionally gates its command's first token against an allowlist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::runstore::RunIndex;

use super::ToolError;

/// Execution context for tools - scoped to one run's workspace
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace directory - all file ops constrained here
    pub workspace: PathBuf,

    /// Owning run id (for log correlation)
    pub run_id: String,

    /// Whether network-using tools may run
    pub network_allowed: bool,

    /// Sandbox knobs (allowlist, timeouts, output caps)
    pub config: ToolsConfig,

    /// Cross-run index, when the pack carries the cross_run_search tool
    pub run_index: Option<Arc<RunIndex>>,
}

impl ToolContext {
    pub fn new(workspace: PathBuf, run_id: impl Into<String>) -> Self {
        Self {
            workspace,
            run_id: run_id.into(),
            network_allowed: false,
            config: ToolsConfig::default(),
            run_index: None,
        }
    }

    pub fn with_network(mut self, allowed: bool) -> Self {
        self.network_allowed = allowed;
        self
    }

    pub fn with_config(mut self, config: ToolsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_run_index(mut self, index: Arc<RunIndex>) -> Self {
        self.run_index = Some(index);
        self
    }

    /// Resolve a path argument for reading or listing
    ///
    /// An empty path resolves to the workspace root itself (valid for
    /// listing).
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(raw);
        if path.is_absolute() {
            return Err(ToolError::PathEscape {
                path: path.to_path_buf(),
                reason: "absolute paths are not allowed, use a relative path".to_string(),
            });
        }

        let joined = self.workspace.join(path);
        let canonical = canonicalize_lenient(&joined);
        let root = canonicalize_lenient(&self.workspace);

        if canonical.starts_with(&root) {
            Ok(canonical)
        } else {
            Err(ToolError::PathEscape {
                path: path.to_path_buf(),
                reason: format!("resolves outside the workspace {}", self.workspace.display()),
            })
        }
    }

    /// Resolve a path argument for writing
    ///
    /// Writing requires a non-empty relative path: the workspace root itself
    /// is not a writable target.
    pub fn resolve_path_for_write(&self, raw: &str) -> Result<PathBuf, ToolError> {
        if raw.trim().is_empty() {
            return Err(ToolError::InvalidArgument(
                "a non-empty relative path is required for writes".to_string(),
            ));
        }
        let resolved = self.resolve_path(raw)?;
        if resolved == canonicalize_lenient(&self.workspace) {
            return Err(ToolError::PathEscape {
                path: PathBuf::from(raw),
                reason: "the workspace root is not a writable target".to_string(),
            });
        }
        Ok(resolved)
    }

    /// Check a shell command's first token against the allowlist
    pub fn check_command(&self, command: &str) -> Result<(), ToolError> {
        let first = command.split_whitespace().next().unwrap_or("");
        let binary = first.rsplit('/').next().unwrap_or(first);
        if self.config.shell_allowlist.iter().any(|allowed| allowed == binary) {
            Ok(())
        } else {
            Err(ToolError::CommandNotAllowed {
                command: first.to_string(),
            })
        }
    }

    /// Apply the configured byte cap, reporting whether truncation happened
    pub fn truncate_output(&self, output: &str) -> (String, bool) {
        let cap = self.config.output_byte_cap;
        if output.len() <= cap {
            return (output.to_string(), false);
        }
        // Cut on a char boundary at or below the cap
        let mut end = cap;
        while end > 0 && !output.is_char_boundary(end) {
            end -= 1;
        }
        (output[..end].to_string(), true)
    }
}

/// Canonicalize, handling paths that do not exist yet (new files)
///
/// The nearest existing ancestor is canonicalized through the filesystem;
/// the non-existent tail is then resolved lexically so `..` components
/// cannot sneak past the prefix check.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut out = existing.canonicalize().unwrap_or(existing);
    for name in tail.iter().rev() {
        if name == ".." {
            out.pop();
        } else if name != "." {
            out.push(name);
        }
    }
    out
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workspace", &self.workspace)
            .field("run_id", &self.run_id)
            .field("network_allowed", &self.network_allowed)
            .finish()
    }
}
