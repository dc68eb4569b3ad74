//! Base packs built from config + the builtin tool registry

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{SpecialistConfig, ToolsConfig};
use crate::llm::ToolDefinition;
use crate::runstore::RunIndex;
use crate::tools::{ToolContext, ToolError, ToolExecutor};

use super::traits::{SpecialistPack, finish_task_definition};

/// Per-run environment handed to pack factories
#[derive(Clone)]
pub struct PackEnv {
    /// This run's sandboxed workspace
    pub workspace: PathBuf,

    /// Run id, for log correlation
    pub run_id: String,

    /// Whether the task permits network tools
    pub network_allowed: bool,

    /// Sandbox knobs
    pub tools_config: ToolsConfig,

    /// Cross-run index for packs carrying cross_run_search
    pub run_index: Option<Arc<RunIndex>>,
}

impl PackEnv {
    fn tool_context(&self) -> ToolContext {
        let mut ctx = ToolContext::new(self.workspace.clone(), self.run_id.clone())
            .with_network(self.network_allowed)
            .with_config(self.tools_config.clone());
        if let Some(index) = &self.run_index {
            ctx = ctx.with_run_index(index.clone());
        }
        ctx
    }
}

/// Finish-gate hook signature
type FinishHook = fn(&Value) -> Result<(), String>;

/// A pack assembled from a tool executor and prompts
pub struct BasePack {
    id: String,
    system_prompt: String,
    executor: ToolExecutor,
    ctx: ToolContext,
    required_finish_fields: Vec<String>,
    finish_hook: Option<FinishHook>,
}

#[async_trait]
impl SpecialistPack for BasePack {
    fn id(&self) -> &str {
        &self.id
    }

    fn system_prompt(&self) -> String {
        self.system_prompt.clone()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.executor.definitions();
        defs.push(finish_task_definition(&self.required_finish_fields));
        defs
    }

    fn required_finish_fields(&self) -> Vec<String> {
        self.required_finish_fields.clone()
    }

    fn validate_finish(&self, payload: &Value) -> Result<(), String> {
        match self.finish_hook {
            Some(hook) => hook(payload),
            None => Ok(()),
        }
    }

    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        self.executor.execute(name, arguments, &self.ctx).await
    }
}

/// Engineering pack: file + shell + test tools, finish gated on verified tests
pub fn build_engineering(config: &SpecialistConfig, env: &PackEnv) -> BasePack {
    let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
        "You are an engineering specialist. You implement, modify, and test code \
         inside a sandboxed workspace using the available tools.\n\
         Rules:\n\
         - Work only through tool calls; paths are relative to the workspace.\n\
         - Run the tests with run_tests before finishing.\n\
         - Call finish_task exactly once, when the work is done and verified."
            .to_string()
    });

    BasePack {
        id: config.id.clone(),
        system_prompt,
        executor: ToolExecutor::for_tools(&config.tools),
        ctx: env.tool_context(),
        required_finish_fields: config.required_finish_fields.clone(),
        finish_hook: Some(engineering_finish_gate),
    }
}

fn engineering_finish_gate(payload: &Value) -> Result<(), String> {
    match payload.get("tests_verified") {
        Some(Value::Bool(true)) => Ok(()),
        _ => Err("finish rejected: tests_verified must be true; run the tests with run_tests first".to_string()),
    }
}

/// Research pack: read-mostly tools plus web and cross-run search
pub fn build_research(config: &SpecialistConfig, env: &PackEnv) -> BasePack {
    let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
        "You are a research specialist. You gather, verify, and summarize \
         information using the available tools, and write your findings into \
         the workspace.\n\
         Rules:\n\
         - Work only through tool calls; paths are relative to the workspace.\n\
         - Cite where each finding came from.\n\
         - Call finish_task exactly once, with a summary and your findings."
            .to_string()
    });

    BasePack {
        id: config.id.clone(),
        system_prompt,
        executor: ToolExecutor::for_tools(&config.tools),
        ctx: env.tool_context(),
        required_finish_fields: config.required_finish_fields.clone(),
        finish_hook: None,
    }
}

/// Default factory for ids without a specialized builder
pub fn build_generic(config: &SpecialistConfig, env: &PackEnv) -> BasePack {
    let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
        format!(
            "You are the {} specialist. Complete the task using the available \
             tools, then call finish_task exactly once with the results.",
            config.id
        )
    });

    BasePack {
        id: config.id.clone(),
        system_prompt,
        executor: ToolExecutor::for_tools(&config.tools),
        ctx: env.tool_context(),
        required_finish_fields: config.required_finish_fields.clone(),
        finish_hook: None,
    }
}
