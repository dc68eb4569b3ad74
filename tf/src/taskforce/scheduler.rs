//! TaskForce - executes an orchestration plan
//!
//! Sequential mode hands each specialist the previous finish payload as
//! context and aborts on the first failure. Parallel mode fans specialists
//! out as tokio tasks, captures per-member failures without aborting
//! siblings, and merges results in plan order.

use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{LlmConfig, LoopConfig};
use crate::domain::{ExecutionMode, OrchestrationPlan, SpecialistBrief, Task};
use crate::events::EventKind;
use crate::llm::{ChatClient, ChatRequest, FallbackChatClient, Message};
use crate::pack::{PackEnv, SpecialistPack, SpecialistRegistry};
use crate::r#loop::{LoopResult, ToolLoop};
use crate::runstore::{Checkpoint, RunLog};

const SYNTHESIS_PROMPT: &str = "You are synthesizing the outputs of several specialists who worked on one task. \
     Write a single coherent summary of what was accomplished, noting any gaps. \
     Respond with plain text only.";

/// Terminal state of a task-force execution
#[derive(Debug, Clone)]
pub enum ForceOutcome {
    /// The run's terminal payload (per-specialist results merged/synthesized)
    Finished { payload: Value },
    /// Cancelled cooperatively; the checkpoint stays intact
    Cancelled,
}

/// Executes a plan's specialists against one run
pub struct TaskForce {
    registry: Arc<SpecialistRegistry>,
    chat: Arc<dyn ChatClient>,
    fallback: Option<Arc<FallbackChatClient>>,
    log: Arc<RunLog>,
    loop_config: LoopConfig,
    llm_config: LlmConfig,
    model: String,
    cancel: watch::Receiver<bool>,
}

impl TaskForce {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SpecialistRegistry>,
        chat: Arc<dyn ChatClient>,
        fallback: Option<Arc<FallbackChatClient>>,
        log: Arc<RunLog>,
        loop_config: LoopConfig,
        llm_config: LlmConfig,
        model: impl Into<String>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            chat,
            fallback,
            log,
            loop_config,
            llm_config,
            model: model.into(),
            cancel,
        }
    }

    /// Execute the plan, updating the checkpoint after each completion
    pub async fn run(
        &self,
        task: &Task,
        plan: &OrchestrationPlan,
        env: &PackEnv,
        checkpoint: &mut Checkpoint,
        run_dir: &Path,
    ) -> Result<ForceOutcome> {
        match plan.mode {
            ExecutionMode::Sequential => self.run_sequential(task, plan, env, checkpoint, run_dir).await,
            ExecutionMode::Parallel => self.run_parallel(task, plan, env).await,
        }
    }

    async fn run_sequential(
        &self,
        task: &Task,
        plan: &OrchestrationPlan,
        env: &PackEnv,
        checkpoint: &mut Checkpoint,
        run_dir: &Path,
    ) -> Result<ForceOutcome> {
        let multi_pack = plan.briefs.len() > 1;
        let mut prev_payload = checkpoint.last_finish_payload.clone();
        let mut sources: Vec<(String, Value)> = Vec::new();

        for (pack_index, brief) in plan.briefs.iter().enumerate() {
            let id = &brief.specialist_id;
            if checkpoint.completed_specialist_ids.contains(id) {
                info!(specialist = %id, "TaskForce: already completed, skipping");
                continue;
            }

            if multi_pack {
                self.log
                    .append(
                        EventKind::PackStart,
                        None,
                        serde_json::json!({ "specialist_id": id, "pack_index": pack_index }),
                    )
                    .await?;
            }

            let pack = self.registry.build(id, env)?;
            pack.open().await.context(format!("failed to open pack {}", id))?;

            let seed = seed_messages(pack.as_ref(), &task.prompt, &brief.brief, prev_payload.as_ref());
            let result = self.run_loop(pack.as_ref(), seed, id).await;

            // Close on every exit path before inspecting the result
            if let Err(e) = pack.close().await {
                warn!(specialist = %id, error = %e, "TaskForce: pack close failed");
            }

            match result? {
                LoopResult::Finished { payload, .. } => {
                    checkpoint.record_completion(id, payload.clone());
                    checkpoint.save(run_dir)?;
                    sources.push((id.clone(), payload.clone()));
                    prev_payload = Some(payload);
                }
                LoopResult::Cancelled => return Ok(ForceOutcome::Cancelled),
            }
        }

        let final_payload = match prev_payload {
            Some(payload) => payload,
            None => serde_json::json!({ "summary": "no specialists executed" }),
        };

        let payload = if plan.synthesis_required && sources.len() > 1 {
            self.synthesize(&sources, final_payload).await
        } else {
            final_payload
        };
        Ok(ForceOutcome::Finished { payload })
    }

    async fn run_parallel(&self, task: &Task, plan: &OrchestrationPlan, env: &PackEnv) -> Result<ForceOutcome> {
        self.log
            .append(
                EventKind::TaskForceParallel,
                None,
                serde_json::json!({ "specialist_ids": plan.specialist_ids(), "mode": "parallel" }),
            )
            .await?;

        let mut handles = Vec::new();
        for (pack_index, brief) in plan.briefs.iter().enumerate() {
            self.log
                .append(
                    EventKind::PackStart,
                    None,
                    serde_json::json!({ "specialist_id": brief.specialist_id, "pack_index": pack_index }),
                )
                .await?;
            handles.push(tokio::spawn(Self::run_member(
                self.registry.clone(),
                self.chat.clone(),
                self.fallback.clone(),
                self.log.clone(),
                self.loop_config.clone(),
                self.llm_config.clone(),
                self.model.clone(),
                self.cancel.clone(),
                task.prompt.clone(),
                brief.clone(),
                env.clone(),
            )));
        }

        // Gather in plan order; sibling failures stay isolated
        let mut per_specialist = serde_json::Map::new();
        let mut errors = Vec::new();
        let mut cancelled = false;
        for (brief, handle) in plan.briefs.iter().zip(handles) {
            let id = brief.specialist_id.clone();
            match handle.await {
                Ok(Ok(LoopResult::Finished { payload, .. })) => {
                    per_specialist.insert(id, payload);
                }
                Ok(Ok(LoopResult::Cancelled)) => cancelled = true,
                Ok(Err(e)) => {
                    warn!(specialist = %id, error = %e, "TaskForce: parallel member failed");
                    errors.push(serde_json::json!({ "specialist": id, "message": e.to_string() }));
                }
                Err(e) => {
                    warn!(specialist = %id, error = %e, "TaskForce: parallel member panicked");
                    errors.push(serde_json::json!({ "specialist": id, "message": format!("task join error: {}", e) }));
                }
            }
        }

        if cancelled {
            return Ok(ForceOutcome::Cancelled);
        }

        let merged = serde_json::json!({
            "per_specialist": Value::Object(per_specialist.clone()),
            "errors": errors,
        });

        let payload = if plan.synthesis_required && errors.is_empty() {
            let sources: Vec<(String, Value)> = per_specialist.into_iter().collect();
            self.synthesize(&sources, merged).await
        } else {
            merged
        };
        Ok(ForceOutcome::Finished { payload })
    }

    /// One parallel member: build, open, run, close
    #[allow(clippy::too_many_arguments)]
    async fn run_member(
        registry: Arc<SpecialistRegistry>,
        chat: Arc<dyn ChatClient>,
        fallback: Option<Arc<FallbackChatClient>>,
        log: Arc<RunLog>,
        loop_config: LoopConfig,
        llm_config: LlmConfig,
        model: String,
        cancel: watch::Receiver<bool>,
        prompt: String,
        brief: SpecialistBrief,
        env: PackEnv,
    ) -> Result<LoopResult> {
        let pack = registry.build(&brief.specialist_id, &env)?;
        pack.open()
            .await
            .context(format!("failed to open pack {}", brief.specialist_id))?;

        let seed = seed_messages(pack.as_ref(), &prompt, &brief.brief, None);
        let mut tool_loop = ToolLoop::new(chat, log, loop_config, llm_config, model, cancel);
        if let Some(fallback) = fallback {
            tool_loop = tool_loop.with_fallback(fallback);
        }
        let result = tool_loop.run(pack.as_ref(), seed, &brief.specialist_id).await;

        if let Err(e) = pack.close().await {
            warn!(specialist = %brief.specialist_id, error = %e, "TaskForce: pack close failed");
        }
        result
    }

    async fn run_loop(&self, pack: &dyn SpecialistPack, seed: Vec<Message>, prefix: &str) -> Result<LoopResult> {
        let mut tool_loop = ToolLoop::new(
            self.chat.clone(),
            self.log.clone(),
            self.loop_config.clone(),
            self.llm_config.clone(),
            self.model.clone(),
            self.cancel.clone(),
        );
        if let Some(fallback) = &self.fallback {
            tool_loop = tool_loop.with_fallback(fallback.clone());
        }
        tool_loop.run(pack, seed, prefix).await
    }

    /// Merge per-specialist payloads into one summary via a final LLM call
    ///
    /// Synthesis failure degrades to the unsynthesized payload rather than
    /// failing a run whose specialists all succeeded.
    async fn synthesize(&self, sources: &[(String, Value)], fallback_payload: Value) -> Value {
        let combined = sources
            .iter()
            .map(|(id, payload)| format!("## {}\n{}", id, payload))
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = ChatRequest {
            messages: vec![Message::system(SYNTHESIS_PROMPT), Message::user(combined)],
            model: self.model.clone(),
            tools: Vec::new(),
            temperature: self.llm_config.temperature,
            top_p: self.llm_config.top_p,
            max_tokens: self.llm_config.max_tokens,
        };

        match self.chat.chat(request).await {
            Ok(response) => {
                let summary = response.content.unwrap_or_default();
                let source_map: serde_json::Map<String, Value> =
                    sources.iter().map(|(id, p)| (id.clone(), p.clone())).collect();
                serde_json::json!({ "summary": summary, "sources": source_map })
            }
            Err(e) => {
                warn!(error = %e, "TaskForce: synthesis call failed, keeping merged payload");
                fallback_payload
            }
        }
    }
}

/// Build a specialist's opening conversation
fn seed_messages(pack: &dyn SpecialistPack, task_prompt: &str, brief: &str, prev_payload: Option<&Value>) -> Vec<Message> {
    let mut user_text = task_prompt.to_string();
    if !brief.is_empty() {
        user_text.push_str("\n\nYour brief: ");
        user_text.push_str(brief);
    }
    if let Some(prev) = prev_payload {
        user_text.push_str("\n\nPrevious specialist output: ");
        user_text.push_str(&prev.to_string());
    }
    vec![Message::system(pack.system_prompt()), Message::user(user_text)]
}
