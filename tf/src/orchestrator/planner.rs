//! LLM planner with capability-routing fallback

use std::sync::Arc;

use eyre::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{LlmConfig, OrchestratorConfig};
use crate::domain::{ExecutionMode, OrchestrationPlan, SpecialistBrief, Task};
use crate::events::EventKind;
use crate::llm::{ChatClient, ChatRequest, Message, ToolDefinition};
use crate::pack::SpecialistRegistry;
use crate::runstore::RunLog;

use super::routing::{greedy_set_cover, infer_capabilities, keyword_score};

/// Name of the synthetic planning tool
const PLAN_TOOL: &str = "create_plan";

/// Decomposes a task prompt into an orchestration plan
///
/// Planner errors never reach the caller: any failure falls back to
/// capability routing, whose inputs are static configuration.
pub struct Orchestrator {
    chat: Arc<dyn ChatClient>,
    llm_config: LlmConfig,
    orchestrator_config: OrchestratorConfig,
    model: String,
}

impl Orchestrator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        llm_config: LlmConfig,
        orchestrator_config: OrchestratorConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            llm_config,
            orchestrator_config,
            model: model.into(),
        }
    }

    /// Produce a plan and record it in the runlog
    pub async fn plan(&self, task: &Task, registry: &SpecialistRegistry, log: &RunLog) -> Result<OrchestrationPlan> {
        match self.plan_with_llm(task, registry).await {
            Ok(plan) => {
                info!(specialists = plan.briefs.len(), mode = ?plan.mode, "Orchestrator: LLM plan accepted");
                log.append(EventKind::OrchestrationPlan, None, plan_payload(&plan)).await?;
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "Orchestrator: planner failed, falling back to capability routing");
                self.plan_by_routing(task, registry, log).await
            }
        }
    }

    async fn plan_with_llm(&self, task: &Task, registry: &SpecialistRegistry) -> Result<OrchestrationPlan> {
        let roster = registry
            .capabilities()
            .iter()
            .map(|(id, caps)| format!("- {}: capabilities [{}]", id, caps.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        let system_prompt = format!(
            "You are a task orchestrator. Decompose the user's task into briefs \
             for the available specialists and call {} exactly once.\n\n\
             Available specialists:\n{}\n\n\
             Guidelines:\n\
             - Use the fewest specialists that cover the task.\n\
             - Use parallel mode only for independent sub-tasks.\n\
             - Each brief should be a concrete, self-contained instruction.",
            PLAN_TOOL, roster
        );

        let request = ChatRequest {
            messages: vec![Message::system(system_prompt), Message::user(task.prompt.clone())],
            model: self.model.clone(),
            tools: vec![plan_tool_definition()],
            temperature: self.llm_config.temperature,
            top_p: self.llm_config.top_p,
            max_tokens: self.llm_config.max_tokens,
        };

        let response = self.chat.chat(request).await?;
        let plan_calls: Vec<_> = response.tool_calls.iter().filter(|c| c.tool_name == PLAN_TOOL).collect();
        let [call] = plan_calls.as_slice() else {
            eyre::bail!("planner emitted {} {} calls, expected exactly 1", plan_calls.len(), PLAN_TOOL);
        };

        let mut plan: OrchestrationPlan = serde_json::from_value(call.arguments.clone())?;
        plan.briefs.retain(|brief| {
            let known = registry.is_known(&brief.specialist_id);
            if !known {
                warn!(id = %brief.specialist_id, "Orchestrator: dropping unknown specialist from plan");
            }
            known
        });
        if plan.briefs.is_empty() {
            eyre::bail!("plan contained no known specialists");
        }
        plan.normalize();
        Ok(plan)
    }

    /// Capability routing: keyword inference + greedy set cover, with
    /// per-pack keyword scoring when nothing is inferred
    async fn plan_by_routing(
        &self,
        task: &Task,
        registry: &SpecialistRegistry,
        log: &RunLog,
    ) -> Result<OrchestrationPlan> {
        let required = infer_capabilities(&task.prompt, &self.orchestrator_config.capability_keywords);

        let chosen_by_cover = if required.is_empty() {
            Vec::new()
        } else {
            greedy_set_cover(&required, &registry.capabilities())
        };

        let (specialist_ids, routing_method) = if !chosen_by_cover.is_empty() {
            (chosen_by_cover, "greedy_set_cover")
        } else {
            let chosen = keyword_score(&task.prompt, &registry.keywords())
                .map(|id| vec![id])
                .unwrap_or_default();
            (chosen, "keyword_score")
        };

        if specialist_ids.is_empty() {
            eyre::bail!("no specialists configured for routing");
        }

        log.append(
            EventKind::Recruitment,
            None,
            serde_json::json!({
                "specialist_ids": specialist_ids,
                "required_capabilities": required,
                "routing_method": routing_method,
            }),
        )
        .await?;

        let mut plan = OrchestrationPlan {
            mode: ExecutionMode::Sequential,
            briefs: specialist_ids
                .iter()
                .map(|id| SpecialistBrief::new(id.clone(), ""))
                .collect(),
            synthesis_required: false,
            reasoning: format!("fallback capability routing via {}", routing_method),
        };
        plan.normalize();

        log.append(EventKind::OrchestrationPlan, None, plan_payload(&plan)).await?;
        Ok(plan)
    }
}

fn plan_payload(plan: &OrchestrationPlan) -> Value {
    serde_json::json!({
        "mode": plan.mode,
        "briefs": plan.briefs,
        "synthesis_required": plan.synthesis_required,
        "reasoning": plan.reasoning,
    })
}

fn plan_tool_definition() -> ToolDefinition {
    ToolDefinition::new(
        PLAN_TOOL,
        "Submit the orchestration plan. Call this exactly once.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["sequential", "parallel"],
                    "description": "How the specialists execute"
                },
                "briefs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "specialist_id": { "type": "string" },
                            "brief": { "type": "string" }
                        },
                        "required": ["specialist_id", "brief"]
                    },
                    "description": "One entry per recruited specialist, in execution order"
                },
                "synthesis_required": {
                    "type": "boolean",
                    "description": "Whether a final synthesis step should merge the results"
                },
                "reasoning": {
                    "type": "string",
                    "description": "Why this decomposition"
                }
            },
            "required": ["mode", "briefs", "synthesis_required", "reasoning"]
        }),
    )
}
