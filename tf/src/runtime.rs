//! Runtime - the control surface over planning, execution, and persistence
//!
//! Submit: create the run directory, checkpoint, plan, execute, write
//! `run_complete`, delete the checkpoint, index the run. Resume: reload the
//! checkpoint, skip completed specialists, and continue appending to the
//! same runlog. Both paths share `drive`, so resumption is idempotent.

use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{OrchestrationPlan, RunId, Task};
use crate::embed::Embedder;
use crate::events::{EventKind, EventQueue, StreamMessage};
use crate::llm::{ChatClient, FallbackChatClient, FallbackPolicy};
use crate::orchestrator::Orchestrator;
use crate::pack::{ContainerRuntime, PackEnv, SpecialistRegistry};
use crate::runstore::{Checkpoint, CreatedRun, RunIndex, RunLog, RunRepository, RunStatus, find_resumable, run_status};
use crate::taskforce::{ForceOutcome, TaskForce};

/// Terminal result of a submitted or resumed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub payload: Value,
    pub cancelled: bool,
}

/// Everything needed to execute tasks end to end
pub struct Runtime {
    config: Config,
    repository: RunRepository,
    registry: Arc<SpecialistRegistry>,
    index: Arc<RunIndex>,
    local_chat: Arc<dyn ChatClient>,
    cloud_chat: Option<Arc<dyn ChatClient>>,
    event_queue: Option<Arc<EventQueue>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Assemble a runtime from config and external collaborators
    pub fn new(config: Config, local_chat: Arc<dyn ChatClient>) -> Self {
        let repository = RunRepository::new(&config.storage.workspace_root);
        let registry = Arc::new(SpecialistRegistry::new(config.clone()));
        let index = Arc::new(RunIndex::new(&config.storage.workspace_root, None));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            config,
            repository,
            registry,
            index,
            local_chat,
            cloud_chat: None,
            event_queue: None,
            cancel_tx,
            cancel_rx,
        }
    }

    /// Attach a cloud chat client for policy-driven escalation
    pub fn with_cloud_chat(mut self, cloud: Arc<dyn ChatClient>) -> Self {
        self.cloud_chat = Some(cloud);
        self
    }

    /// Attach an embedder for semantic run indexing
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.index = Arc::new(RunIndex::new(&self.config.storage.workspace_root, Some(embedder)));
        self
    }

    /// Attach a container runtime for containerised packs
    pub fn with_container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.registry = Arc::new(
            SpecialistRegistry::new(self.config.clone()).with_container_runtime(runtime),
        );
        self
    }

    /// Attach a streaming queue; events mirror into it best-effort
    pub fn with_event_queue(mut self, queue: Arc<EventQueue>) -> Self {
        self.event_queue = Some(queue);
        self
    }

    /// Request cooperative cancellation of in-flight runs
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Submit a task: plan it, run it, persist everything
    pub async fn submit(&self, task: Task) -> Result<RunOutcome> {
        let created = self.repository.create_run()?;
        info!(run_id = %created.run_id, "Runtime: run created");

        let log = Arc::new(RunLog::open(
            &created.run_dir,
            self.event_queue.clone(),
            self.config.storage.fsync_events,
        )?);

        let result = self.plan_and_drive(&task, &created, &log).await;
        self.finish_streaming(&log, &result);
        result
    }

    /// Resume an interrupted run from its checkpoint
    pub async fn resume(&self, run_id: &RunId) -> Result<RunOutcome> {
        let created = self.repository.open_run(run_id)?;
        let checkpoint = Checkpoint::load(&created.run_dir)?
            .ok_or_else(|| eyre::eyre!("Run {} has no checkpoint (already complete or never started)", run_id))?;

        // A stale checkpoint next to a completed runlog: emit nothing new
        if run_status(&created.run_dir) == RunStatus::Completed {
            info!(run_id = %run_id, "Runtime: run already complete, resume is a no-op");
            Checkpoint::delete(&created.run_dir)?;
            return Ok(RunOutcome {
                run_id: run_id.clone(),
                payload: checkpoint.last_finish_payload.unwrap_or_else(|| serde_json::json!({})),
                cancelled: false,
            });
        }

        info!(run_id = %run_id, completed = checkpoint.completed_specialist_ids.len(), "Runtime: resuming");
        let log = Arc::new(RunLog::open(
            &created.run_dir,
            self.event_queue.clone(),
            self.config.storage.fsync_events,
        )?);

        let task = checkpoint.task.clone();
        let plan = checkpoint.plan.clone();
        let result = self.drive(&task, plan, checkpoint, &created, &log).await;
        self.finish_streaming(&log, &result);
        result
    }

    /// Runs with a checkpoint and no `run_complete` event
    pub fn list_resumable(&self) -> Result<Vec<Checkpoint>> {
        find_resumable(self.repository.workspace_root())
    }

    /// Status of a run derived from its runlog
    pub fn status(&self, run_id: &RunId) -> RunStatus {
        run_status(&self.repository.run_dir(run_id))
    }

    async fn plan_and_drive(&self, task: &Task, created: &CreatedRun, log: &Arc<RunLog>) -> Result<RunOutcome> {
        let model = self.config.model_for_tier(&task.model_tier);
        let (chat, _) = self.chat_stack();

        // Explicit specialist requests bypass the planner
        let plan = if let Some(id) = &task.specialist {
            if !self.registry.is_known(id) {
                eyre::bail!("Unknown specialist id: {}", id);
            }
            let plan = OrchestrationPlan::single(id.clone(), "explicit specialist request");
            log.append(
                EventKind::OrchestrationPlan,
                None,
                serde_json::json!({
                    "mode": plan.mode,
                    "briefs": plan.briefs,
                    "synthesis_required": plan.synthesis_required,
                    "reasoning": plan.reasoning,
                }),
            )
            .await?;
            plan
        } else {
            let orchestrator = Orchestrator::new(
                chat.clone(),
                self.config.llm.clone(),
                self.config.orchestrator.clone(),
                model.clone(),
            );
            orchestrator.plan(task, &self.registry, log).await?
        };

        let checkpoint = Checkpoint::initial(created.run_id.clone(), task.clone(), plan.clone());
        checkpoint.save(&created.run_dir)?;

        self.drive(task, plan, checkpoint, created, log).await
    }

    /// Shared execution path for fresh and resumed runs
    async fn drive(
        &self,
        task: &Task,
        plan: OrchestrationPlan,
        mut checkpoint: Checkpoint,
        created: &CreatedRun,
        log: &Arc<RunLog>,
    ) -> Result<RunOutcome> {
        let model = self.config.model_for_tier(&task.model_tier);
        let (chat, fallback) = self.chat_stack();

        let env = PackEnv {
            workspace: created.workspace.clone(),
            run_id: created.run_id.to_string(),
            network_allowed: task.network_allowed,
            tools_config: self.config.tools.clone(),
            run_index: Some(self.index.clone()),
        };

        let force = TaskForce::new(
            self.registry.clone(),
            chat,
            fallback,
            log.clone(),
            self.config.tool_loop.clone(),
            self.config.llm.clone(),
            model,
            self.cancel_rx.clone(),
        );

        let outcome = force
            .run(task, &plan, &env, &mut checkpoint, &created.run_dir)
            .await
            .context("task force execution failed")?;

        match outcome {
            ForceOutcome::Cancelled => {
                info!(run_id = %created.run_id, "Runtime: run cancelled, checkpoint preserved");
                Ok(RunOutcome {
                    run_id: created.run_id.clone(),
                    payload: serde_json::json!({ "cancelled": true }),
                    cancelled: true,
                })
            }
            ForceOutcome::Finished { payload } => {
                log.append(
                    EventKind::RunComplete,
                    None,
                    serde_json::json!({
                        "run_id": created.run_id,
                        "specialist_ids": plan.specialist_ids(),
                        "task_force_mode": plan.mode,
                    }),
                )
                .await?;
                Checkpoint::delete(&created.run_dir)?;
                self.index_run(task, &plan, created, &payload).await;

                info!(run_id = %created.run_id, "Runtime: run complete");
                Ok(RunOutcome {
                    run_id: created.run_id.clone(),
                    payload,
                    cancelled: false,
                })
            }
        }
    }

    /// Build the chat client, wrapped for fallback when configured
    fn chat_stack(&self) -> (Arc<dyn ChatClient>, Option<Arc<FallbackChatClient>>) {
        let policy = FallbackPolicy::from_config(self.config.fallback.policy);
        match (policy, &self.cloud_chat) {
            (Some(policy), Some(cloud)) => {
                let fallback = Arc::new(FallbackChatClient::new(self.local_chat.clone(), cloud.clone(), policy));
                let chat: Arc<dyn ChatClient> = fallback.clone();
                (chat, Some(fallback))
            }
            _ => (self.local_chat.clone(), None),
        }
    }

    async fn index_run(&self, task: &Task, plan: &OrchestrationPlan, created: &CreatedRun, payload: &Value) {
        let finish_summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Err(e) = self
            .index
            .append(
                created.run_id.clone(),
                plan.specialist_ids(),
                &task.prompt,
                &finish_summary,
                created.workspace.clone(),
            )
            .await
        {
            warn!(run_id = %created.run_id, error = %e, "Runtime: failed to index run");
        }
    }

    /// Enqueue the closing stream sentinel
    fn finish_streaming(&self, log: &RunLog, result: &Result<RunOutcome>) {
        match result {
            Ok(outcome) if !outcome.cancelled => log.push_sentinel(StreamMessage::RunDone),
            Ok(_) => {}
            Err(_) => log.push_sentinel(StreamMessage::RunError),
        }
    }

    /// Search the cross-run index directly
    pub async fn search_runs(&self, query: &str, top_k: usize) -> Result<Vec<crate::runstore::RunIndexEntry>> {
        self.index.search(query, top_k).await
    }

    /// The workspace directory of a run, for artifact inspection
    pub fn run_workspace(&self, run_id: &RunId) -> std::path::PathBuf {
        self.repository.run_dir(run_id).join("workspace")
    }

    /// The runlog path of a run
    pub fn runlog_path(&self, run_id: &RunId) -> std::path::PathBuf {
        self.repository.run_dir(run_id).join("runlog.jsonl")
    }

    pub fn workspace_root(&self) -> &Path {
        self.repository.workspace_root()
    }
}
