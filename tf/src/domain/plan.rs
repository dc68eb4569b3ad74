//! Orchestration plans - the planner's output

use serde::{Deserialize, Serialize};

/// How a multi-specialist plan is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Specialists run one after another, each seeing the previous finish payload
    Sequential,
    /// Specialists run concurrently; results are merged
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// One specialist's assignment within a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistBrief {
    pub specialist_id: String,
    /// Free-text instructions scoped to this specialist; may be empty
    #[serde(default)]
    pub brief: String,
}

impl SpecialistBrief {
    pub fn new(specialist_id: impl Into<String>, brief: impl Into<String>) -> Self {
        Self {
            specialist_id: specialist_id.into(),
            brief: brief.into(),
        }
    }
}

/// The planner's decomposition of a task
///
/// Plans are ephemeral: they are recorded as an `orchestration_plan` runlog
/// event and inside the checkpoint, never as a standalone artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub mode: ExecutionMode,
    pub briefs: Vec<SpecialistBrief>,
    pub synthesis_required: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl OrchestrationPlan {
    /// Single-specialist plan with an empty brief (the routing fallback shape)
    pub fn single(specialist_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            briefs: vec![SpecialistBrief::new(specialist_id, "")],
            synthesis_required: false,
            reasoning: reasoning.into(),
        }
    }

    /// Enforce the plan invariants in place
    ///
    /// Multi-specialist plans always require synthesis, and the mode of a
    /// single-specialist plan is irrelevant so it is clamped to sequential.
    pub fn normalize(&mut self) {
        if self.briefs.len() >= 2 {
            self.synthesis_required = true;
        } else {
            self.mode = ExecutionMode::Sequential;
        }
    }

    /// Ids in brief order
    pub fn specialist_ids(&self) -> Vec<String> {
        self.briefs.iter().map(|b| b.specialist_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_plan() {
        let plan = OrchestrationPlan::single("engineering", "direct route");
        assert_eq!(plan.briefs.len(), 1);
        assert_eq!(plan.mode, ExecutionMode::Sequential);
        assert!(!plan.synthesis_required);
    }

    #[test]
    fn test_normalize_forces_synthesis_on_multi() {
        let mut plan = OrchestrationPlan {
            mode: ExecutionMode::Parallel,
            briefs: vec![
                SpecialistBrief::new("engineering", "build it"),
                SpecialistBrief::new("research", "find prior art"),
            ],
            synthesis_required: false,
            reasoning: String::new(),
        };
        plan.normalize();
        assert!(plan.synthesis_required);
        assert_eq!(plan.mode, ExecutionMode::Parallel);
    }

    #[test]
    fn test_normalize_clamps_single_to_sequential() {
        let mut plan = OrchestrationPlan {
            mode: ExecutionMode::Parallel,
            briefs: vec![SpecialistBrief::new("engineering", "")],
            synthesis_required: false,
            reasoning: String::new(),
        };
        plan.normalize();
        assert_eq!(plan.mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&ExecutionMode::Sequential).unwrap(), r#""sequential""#);
        assert_eq!(serde_json::to_string(&ExecutionMode::Parallel).unwrap(), r#""parallel""#);
    }

    #[test]
    fn test_plan_roundtrip() {
        let plan = OrchestrationPlan {
            mode: ExecutionMode::Parallel,
            briefs: vec![SpecialistBrief::new("a", "x"), SpecialistBrief::new("b", "y")],
            synthesis_required: true,
            reasoning: "because".to_string(),
        };
        let json = serde_json::to_string(&plan).unwrap();
        let parsed: OrchestrationPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.specialist_ids(), vec!["a", "b"]);
        assert!(parsed.synthesis_required);
    }
}
