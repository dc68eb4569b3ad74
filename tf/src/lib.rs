//! TaskForce - specialist-pack agent orchestration runtime
//!
//! Given a natural-language task, TaskForce decomposes it into briefs,
//! recruits specialist packs (stateless bundles of system prompt + tools),
//! and drives each one through an LLM tool-calling loop until a validated
//! `finish_task` call ends it. Every run persists as a content-addressed
//! directory: an append-only JSONL event log, a sandboxed workspace, and a
//! crash-safe checkpoint that makes interrupted runs resumable.
//!
//! # Core Concepts
//!
//! - **Specialist packs**: stateless capability bundles, instantiated per run
//! - **Tool loop**: the inner LLM/tool cycle with finish gates and recovery
//! - **Task force**: sequential context-handoff or parallel fan-out execution
//! - **Runlog**: the append-only JSONL record that is the source of truth
//! - **Checkpoint**: atomic-write completion state; its presence marks a run
//!   as resumable
//!
//! # Modules
//!
//! - [`llm`] - chat client trait, types, and the cloud-fallback wrapper
//! - [`pack`] - specialist packs, MCP/container wrappers, the registry
//! - [`tools`] - sandboxed tool registry and builtin tools
//! - [`mcp`] - MCP session transports and the tool multiplexer
//! - [`r#loop`] - the per-specialist tool loop
//! - [`orchestrator`] - LLM planner with capability-routing fallback
//! - [`taskforce`] - sequential/parallel plan execution
//! - [`runstore`] - run directories, runlogs, checkpoints, the run index
//! - [`runtime`] - submit/resume/status over all of the above

pub mod cli;
pub mod config;
pub mod domain;
pub mod embed;
pub mod events;
pub mod llm;
pub mod mcp;
pub mod orchestrator;
pub mod pack;
pub mod runstore;
pub mod runtime;
pub mod taskforce;
pub mod tools;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use config::{Config, FallbackPolicyConfig, LlmConfig, McpServerConfig, McpTransport, SpecialistConfig};
pub use domain::{ExecutionMode, OrchestrationPlan, RunId, SpecialistBrief, Task};
pub use embed::Embedder;
pub use events::{EventKind, EventQueue, RunEvent, StreamMessage};
pub use llm::{ChatClient, ChatRequest, ChatResponse, FallbackChatClient, FallbackPolicy, LlmError, Message, Role, ToolCallRequest, ToolDefinition};
pub use mcp::{McpMultiplexer, McpSession, SseSession, StdioSession};
pub use orchestrator::Orchestrator;
pub use pack::{BasePack, ContainerPack, ContainerRuntime, FINISH_TOOL, McpPack, PackEnv, SpecialistPack, SpecialistRegistry};
pub use r#loop::{LoopResult, ToolLoop};
pub use runstore::{Checkpoint, RunIndex, RunIndexEntry, RunLog, RunRepository, RunStatus, read_runlog, run_status};
pub use runtime::{RunOutcome, Runtime};
pub use taskforce::{ForceOutcome, TaskForce};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor};
