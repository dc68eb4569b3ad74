//! Runlog event types
//!
//! The `kind` names are a stable wire vocabulary: external consumers parse
//! runlogs by these strings, so renames are breaking changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Enumerated runlog event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Planner output (LLM-produced or fallback)
    OrchestrationPlan,
    /// Fallback capability routing chose the specialists
    Recruitment,
    /// Parallel task-force fan-out is starting
    TaskForceParallel,
    /// A specialist pack is about to run (multi-pack runs)
    PackStart,
    /// About to call the chat client
    LlmRequest,
    /// Chat client returned
    LlmResponse,
    /// Zero-tool-call recovery nudge appended
    CorrectiveReprompt,
    /// Local-to-cloud chat escalation happened
    CloudFallback,
    /// About to invoke a tool
    ToolCall,
    /// Tool invocation succeeded (or finish accepted)
    ToolResult,
    /// Tool invocation failed
    ToolError,
    /// Sandbox violation audit record
    SecurityEvent,
    /// Terminal success marker, exactly once per completed run
    RunComplete,
}

impl EventKind {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrchestrationPlan => "orchestration_plan",
            EventKind::Recruitment => "recruitment",
            EventKind::TaskForceParallel => "task_force_parallel",
            EventKind::PackStart => "pack_start",
            EventKind::LlmRequest => "llm_request",
            EventKind::LlmResponse => "llm_response",
            EventKind::CorrectiveReprompt => "corrective_reprompt",
            EventKind::CloudFallback => "cloud_fallback",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::ToolError => "tool_error",
            EventKind::SecurityEvent => "security_event",
            EventKind::RunComplete => "run_complete",
        }
    }
}

/// One runlog record
///
/// `ts` is monotonic seconds since run start (not wall clock), `seq` is the
/// run-scoped append sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub ts: f64,
    pub seq: u64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub payload: Value,
}

/// Streaming wrapper delivered to event-queue consumers
///
/// The sentinels close the stream; they are never written to the runlog.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    Event(RunEvent),
    /// `_run_done_` - the run finished successfully
    RunDone,
    /// `_run_error_` - the run aborted
    RunError,
}

impl StreamMessage {
    /// Wire name for sentinel messages, None for regular events
    pub fn sentinel_name(&self) -> Option<&'static str> {
        match self {
            StreamMessage::Event(_) => None,
            StreamMessage::RunDone => Some("_run_done_"),
            StreamMessage::RunError => Some("_run_error_"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(EventKind::OrchestrationPlan.as_str(), "orchestration_plan");
        assert_eq!(EventKind::RunComplete.as_str(), "run_complete");
        assert_eq!(EventKind::SecurityEvent.as_str(), "security_event");
        // serde uses the same names
        assert_eq!(
            serde_json::to_string(&EventKind::CloudFallback).unwrap(),
            r#""cloud_fallback""#
        );
    }

    #[test]
    fn test_event_roundtrip() {
        let event = RunEvent {
            ts: 1.25,
            seq: 3,
            kind: EventKind::ToolCall,
            step: Some("engineering_step_2".to_string()),
            payload: serde_json::json!({"tool": "write_file"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RunEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::ToolCall);
        assert_eq!(parsed.step.as_deref(), Some("engineering_step_2"));
        assert_eq!(parsed.seq, 3);
    }

    #[test]
    fn test_step_omitted_when_none() {
        let event = RunEvent {
            ts: 0.0,
            seq: 0,
            kind: EventKind::RunComplete,
            step: None,
            payload: serde_json::json!({}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("step"));
    }

    #[test]
    fn test_sentinel_names() {
        assert_eq!(StreamMessage::RunDone.sentinel_name(), Some("_run_done_"));
        assert_eq!(StreamMessage::RunError.sentinel_name(), Some("_run_error_"));
        let event = RunEvent {
            ts: 0.0,
            seq: 0,
            kind: EventKind::LlmRequest,
            step: None,
            payload: serde_json::json!({}),
        };
        assert!(StreamMessage::Event(event).sentinel_name().is_none());
    }
}
