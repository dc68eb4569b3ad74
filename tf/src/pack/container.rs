//! Containerised pack wrapper
//!
//! Redirects only the `shell` tool through a container runtime; every other
//! tool (including MCP tools, which run on the host) delegates to the inner
//! pack. This is why the registry composes the container wrapper outermost.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::llm::ToolDefinition;
use crate::tools::ToolError;

use super::traits::SpecialistPack;

/// Output of one exec inside a container
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// External container runtime contract
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container with the workspace mounted; returns the container id
    async fn start(&self, image: &str, volume_mount: &Path) -> eyre::Result<String>;

    /// Run a command inside the container
    async fn exec(&self, container_id: &str, command: &str, cwd: &str) -> eyre::Result<ExecOutput>;

    /// Stop and remove the container
    async fn stop(&self, container_id: &str) -> eyre::Result<()>;
}

/// Mount point of the workspace inside the container
const CONTAINER_WORKDIR: &str = "/workspace";

/// Wraps a pack so its shell commands run inside a container
pub struct ContainerPack {
    inner: Box<dyn SpecialistPack>,
    image: String,
    workspace: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    container_id: Mutex<Option<String>>,
}

impl ContainerPack {
    pub fn new(
        inner: Box<dyn SpecialistPack>,
        image: impl Into<String>,
        workspace: PathBuf,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            inner,
            image: image.into(),
            workspace,
            runtime,
            container_id: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SpecialistPack for ContainerPack {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn system_prompt(&self) -> String {
        self.inner.system_prompt()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.inner.tool_definitions()
    }

    fn required_finish_fields(&self) -> Vec<String> {
        self.inner.required_finish_fields()
    }

    fn validate_finish(&self, payload: &Value) -> Result<(), String> {
        self.inner.validate_finish(payload)
    }

    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        if name != "shell" {
            return self.inner.execute_tool(name, arguments).await;
        }

        let command = arguments
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgument("command is required".to_string()))?;

        let guard = self.container_id.lock().await;
        let container_id = guard
            .as_ref()
            .ok_or_else(|| ToolError::Other("container is not running".to_string()))?;

        debug!(container = %container_id, %command, "ContainerPack: exec");
        let output = self
            .runtime
            .exec(container_id, command, CONTAINER_WORKDIR)
            .await
            .map_err(|e| ToolError::Other(format!("container exec failed: {}", e)))?;

        Ok(serde_json::json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
        }))
    }

    async fn open(&self) -> eyre::Result<()> {
        self.inner.open().await?;
        debug!(image = %self.image, "ContainerPack: starting container");
        let id = self.runtime.start(&self.image, &self.workspace).await?;
        *self.container_id.lock().await = Some(id);
        Ok(())
    }

    async fn close(&self) -> eyre::Result<()> {
        if let Some(id) = self.container_id.lock().await.take()
            && let Err(e) = self.runtime.stop(&id).await
        {
            warn!(container = %id, error = %e, "ContainerPack: stop failed");
        }
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::pack::FINISH_TOOL;

    struct StubPack;

    #[async_trait]
    impl SpecialistPack for StubPack {
        fn id(&self) -> &str {
            "stub"
        }

        fn system_prompt(&self) -> String {
            "stub".to_string()
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new(FINISH_TOOL, "finish", serde_json::json!({}))]
        }

        fn required_finish_fields(&self) -> Vec<String> {
            vec!["summary".to_string()]
        }

        async fn execute_tool(&self, name: &str, _arguments: Value) -> Result<Value, ToolError> {
            Ok(serde_json::json!({ "inner_tool": name }))
        }
    }

    /// Records calls instead of launching anything
    struct FakeRuntime {
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl FakeRuntime {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn start(&self, image: &str, _volume_mount: &Path) -> eyre::Result<String> {
            self.started.store(true, Ordering::SeqCst);
            Ok(format!("container-{}", image))
        }

        async fn exec(&self, container_id: &str, command: &str, cwd: &str) -> eyre::Result<ExecOutput> {
            Ok(ExecOutput {
                stdout: format!("{} ran '{}' in {}", container_id, command, cwd),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        async fn stop(&self, _container_id: &str) -> eyre::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shell_redirects_through_container() {
        let runtime = FakeRuntime::new();
        let pack = ContainerPack::new(
            Box::new(StubPack),
            "python:3.12",
            PathBuf::from("/tmp/ws"),
            runtime.clone(),
        );
        pack.open().await.unwrap();
        assert!(runtime.started.load(Ordering::SeqCst));

        let result = pack
            .execute_tool("shell", serde_json::json!({"command": "pytest"}))
            .await
            .unwrap();
        assert!(result["stdout"].as_str().unwrap().contains("container-python:3.12"));
        assert!(result["stdout"].as_str().unwrap().contains("/workspace"));

        pack.close().await.unwrap();
        assert!(runtime.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_non_shell_tools_delegate() {
        let pack = ContainerPack::new(
            Box::new(StubPack),
            "python:3.12",
            PathBuf::from("/tmp/ws"),
            FakeRuntime::new(),
        );
        pack.open().await.unwrap();

        let result = pack.execute_tool("read_file", serde_json::json!({})).await.unwrap();
        assert_eq!(result["inner_tool"], "read_file");

        pack.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_shell_before_open_fails() {
        let pack = ContainerPack::new(
            Box::new(StubPack),
            "python:3.12",
            PathBuf::from("/tmp/ws"),
            FakeRuntime::new(),
        );
        let err = pack
            .execute_tool("shell", serde_json::json!({"command": "ls"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not running"));
    }
}
