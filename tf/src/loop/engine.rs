//! ToolLoop - drives one specialist until a valid finish_task or budget end
//!
//! Each step: call the chat client with the pack's tools, execute the tool
//! calls it emits in order, append their results to the message array, and
//! repeat. The loop ends when a finish_task call passes all gates, when the
//! model degenerates to plain text three times in a row, or when the step
//! budget runs out.

use std::sync::Arc;

use eyre::{Context, Result};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, LoopConfig};
use crate::events::EventKind;
use crate::llm::{ChatClient, ChatRequest, ChatResponse, FallbackChatClient, Message};
use crate::pack::{FINISH_TOOL, SpecialistPack};
use crate::runstore::RunLog;

/// Corrective nudge appended after a zero-tool-call response
const REPROMPT_NUDGE: &str = "You must respond with a tool call. Use the available tools to make progress, \
     and call finish_task when the task is complete.";

/// Terminal state of one specialist's loop
#[derive(Debug, Clone)]
pub enum LoopResult {
    /// A finish payload was produced (accepted finish, text fallback, or
    /// step-budget marker)
    Finished { payload: Value, steps: u32 },
    /// Cancelled cooperatively; checkpoint stays intact
    Cancelled,
}

/// Drives one specialist through LLM/tool cycles
pub struct ToolLoop {
    chat: Arc<dyn ChatClient>,
    fallback: Option<Arc<FallbackChatClient>>,
    log: Arc<RunLog>,
    loop_config: LoopConfig,
    llm_config: LlmConfig,
    model: String,
    cancel: watch::Receiver<bool>,
}

impl ToolLoop {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        log: Arc<RunLog>,
        loop_config: LoopConfig,
        llm_config: LlmConfig,
        model: impl Into<String>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chat,
            fallback: None,
            log,
            loop_config,
            llm_config,
            model: model.into(),
            cancel,
        }
    }

    /// Attach the fallback wrapper so its queued events get drained into the
    /// runlog (the wrapper must be the same client passed as `chat`)
    pub fn with_fallback(mut self, fallback: Arc<FallbackChatClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Run the loop for an opened pack
    ///
    /// `seed_messages` is the initial conversation (system prompt + task);
    /// `step_prefix` tags this specialist's events in the shared runlog.
    pub async fn run(
        &mut self,
        pack: &dyn SpecialistPack,
        seed_messages: Vec<Message>,
        step_prefix: &str,
    ) -> Result<LoopResult> {
        let mut messages = seed_messages;
        let mut step: u32 = 0;
        let mut reprompt_count: u32 = 0;
        let mut non_finish_call_seen = false;
        let tools = pack.tool_definitions();
        let required_fields = pack.required_finish_fields();

        info!(pack = pack.id(), max_steps = self.loop_config.max_steps, "ToolLoop: starting");

        loop {
            if *self.cancel.borrow() {
                info!(pack = pack.id(), "ToolLoop: cancelled before step");
                return Ok(LoopResult::Cancelled);
            }

            step += 1;
            let tag = format!("{}_step_{}", step_prefix, step);

            self.log
                .append(
                    EventKind::LlmRequest,
                    Some(tag.clone()),
                    serde_json::json!({ "step": step, "message_count": messages.len() }),
                )
                .await?;

            let request = ChatRequest {
                messages: messages.clone(),
                model: self.model.clone(),
                tools: tools.clone(),
                temperature: self.llm_config.temperature,
                top_p: self.llm_config.top_p,
                max_tokens: self.llm_config.max_tokens,
            };

            let mut cancel = self.cancel.clone();
            let response = tokio::select! {
                r = self.chat.chat(request) => r.context("chat transport failed")?,
                _ = cancel.changed() => {
                    info!(pack = pack.id(), "ToolLoop: cancelled during chat call");
                    return Ok(LoopResult::Cancelled);
                }
            };

            self.drain_fallback_events(&tag).await?;
            self.log_response(&tag, &response).await?;

            if response.tool_calls.is_empty() {
                let content = response.content.clone().unwrap_or_default();
                if reprompt_count < 2 {
                    reprompt_count += 1;
                    messages.push(Message::assistant(response.content, Vec::new()));
                    messages.push(Message::system(REPROMPT_NUDGE));
                    self.log
                        .append(
                            EventKind::CorrectiveReprompt,
                            Some(tag.clone()),
                            serde_json::json!({ "reprompt_count": reprompt_count }),
                        )
                        .await?;
                    debug!(pack = pack.id(), reprompt_count, "ToolLoop: corrective reprompt");
                } else {
                    // Third plain-text response in a row: take the text as a
                    // minimal finish payload
                    warn!(pack = pack.id(), "ToolLoop: accepting plain text as fallback payload");
                    let payload = serde_json::json!({ "summary": content, "fallback": true });
                    return Ok(LoopResult::Finished { payload, steps: step });
                }
            } else {
                reprompt_count = 0;
                messages.push(Message::assistant(response.content.clone(), response.tool_calls.clone()));

                for call in &response.tool_calls {
                    if *self.cancel.borrow() {
                        info!(pack = pack.id(), "ToolLoop: cancelled between tool calls");
                        return Ok(LoopResult::Cancelled);
                    }

                    self.log
                        .append(
                            EventKind::ToolCall,
                            Some(tag.clone()),
                            serde_json::json!({ "tool": call.tool_name, "args": call.arguments }),
                        )
                        .await?;

                    if call.tool_name == FINISH_TOOL {
                        match self.check_finish_gates(pack, &required_fields, non_finish_call_seen, &call.arguments) {
                            Ok(()) => {
                                self.log
                                    .append(
                                        EventKind::ToolResult,
                                        Some(tag.clone()),
                                        serde_json::json!({ "tool": FINISH_TOOL, "result": call.arguments }),
                                    )
                                    .await?;
                                info!(pack = pack.id(), steps = step, "ToolLoop: finish accepted");
                                return Ok(LoopResult::Finished {
                                    payload: call.arguments.clone(),
                                    steps: step,
                                });
                            }
                            Err(reason) => {
                                self.log
                                    .append(
                                        EventKind::ToolError,
                                        Some(tag.clone()),
                                        serde_json::json!({
                                            "tool": FINISH_TOOL,
                                            "error_type": "GateFailure",
                                            "error_message": reason,
                                        }),
                                    )
                                    .await?;
                                messages.push(Message::tool_result(
                                    call.call_id.clone(),
                                    &serde_json::json!({ "error": reason }),
                                ));
                            }
                        }
                        continue;
                    }

                    non_finish_call_seen = true;
                    match pack.execute_tool(&call.tool_name, call.arguments.clone()).await {
                        Ok(result) => {
                            self.log
                                .append(
                                    EventKind::ToolResult,
                                    Some(tag.clone()),
                                    serde_json::json!({ "tool": call.tool_name, "result": result }),
                                )
                                .await?;
                            messages.push(Message::tool_result(call.call_id.clone(), &result));
                        }
                        Err(error) => {
                            let message = error.to_string();
                            self.log
                                .append(
                                    EventKind::ToolError,
                                    Some(tag.clone()),
                                    serde_json::json!({
                                        "tool": call.tool_name,
                                        "error_type": error.error_type(),
                                        "error_message": message,
                                    }),
                                )
                                .await?;
                            if error.is_security_violation() {
                                self.log
                                    .append(
                                        EventKind::SecurityEvent,
                                        Some(tag.clone()),
                                        serde_json::json!({
                                            "event_type": "sandbox_violation",
                                            "tool": call.tool_name,
                                            "error_message": message,
                                        }),
                                    )
                                    .await?;
                            }
                            messages.push(Message::tool_result(
                                call.call_id.clone(),
                                &serde_json::json!({ "error": message }),
                            ));
                        }
                    }
                }
            }

            if step >= self.loop_config.max_steps {
                warn!(pack = pack.id(), step, "ToolLoop: step budget exceeded");
                let payload = serde_json::json!({
                    "summary": "step budget exceeded",
                    "max_steps_exceeded": true,
                    "steps": step,
                });
                return Ok(LoopResult::Finished { payload, steps: step });
            }
        }
    }

    /// The three finish gates, in order
    fn check_finish_gates(
        &self,
        pack: &dyn SpecialistPack,
        required_fields: &[String],
        non_finish_call_seen: bool,
        arguments: &Value,
    ) -> std::result::Result<(), String> {
        if !non_finish_call_seen {
            return Err("finish rejected: you must call at least one non-finish tool first".to_string());
        }

        let missing: Vec<&str> = required_fields
            .iter()
            .filter(|field| arguments.get(field.as_str()).is_none())
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("finish rejected: missing required fields: {}", missing.join(", ")));
        }

        pack.validate_finish(arguments)
    }

    async fn drain_fallback_events(&self, tag: &str) -> Result<()> {
        if let Some(fallback) = &self.fallback {
            for event in fallback.drain_events().await {
                self.log
                    .append(EventKind::CloudFallback, Some(tag.to_string()), serde_json::to_value(&event)?)
                    .await?;
            }
        }
        Ok(())
    }

    async fn log_response(&self, tag: &str, response: &ChatResponse) -> Result<()> {
        let content: String = response
            .content
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(self.loop_config.content_log_cap)
            .collect();
        let tool_calls: Vec<Value> = response
            .tool_calls
            .iter()
            .map(|c| serde_json::json!({ "call_id": c.call_id, "tool": c.tool_name }))
            .collect();
        self.log
            .append(
                EventKind::LlmResponse,
                Some(tag.to_string()),
                serde_json::json!({ "content": content, "tool_calls": tool_calls }),
            )
            .await?;
        Ok(())
    }
}
