//! Task - the immutable input to a run

use serde::{Deserialize, Serialize};

use super::RunId;

/// A task submitted to the runtime
///
/// Tasks are immutable once created: the runtime records the task in the
/// initial checkpoint and never mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Natural-language prompt describing what to do
    pub prompt: String,

    /// Explicit specialist id, bypassing the orchestrator when set
    #[serde(default)]
    pub specialist: Option<String>,

    /// Model tier key, e.g. "fast" or "quality"
    #[serde(default = "default_tier")]
    pub model_tier: String,

    /// Whether network-using tools (web_search, fetch_url) are permitted
    #[serde(default)]
    pub network_allowed: bool,

    /// Parent run id when resuming
    #[serde(default)]
    pub parent_run: Option<RunId>,
}

fn default_tier() -> String {
    "fast".to_string()
}

impl Task {
    /// Create a task from a prompt with defaults for everything else
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            specialist: None,
            model_tier: default_tier(),
            network_allowed: false,
            parent_run: None,
        }
    }

    /// Builder-style: pin an explicit specialist
    pub fn with_specialist(mut self, id: impl Into<String>) -> Self {
        self.specialist = Some(id.into());
        self
    }

    /// Builder-style: allow network tools
    pub fn with_network(mut self) -> Self {
        self.network_allowed = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults() {
        let task = Task::new("do a thing");
        assert_eq!(task.prompt, "do a thing");
        assert_eq!(task.model_tier, "fast");
        assert!(!task.network_allowed);
        assert!(task.specialist.is_none());
    }

    #[test]
    fn test_task_builders() {
        let task = Task::new("x").with_specialist("engineering").with_network();
        assert_eq!(task.specialist.as_deref(), Some("engineering"));
        assert!(task.network_allowed);
    }

    #[test]
    fn test_task_deserialize_minimal() {
        let task: Task = serde_json::from_str(r#"{"prompt": "hello"}"#).unwrap();
        assert_eq!(task.prompt, "hello");
        assert_eq!(task.model_tier, "fast");
    }
}
