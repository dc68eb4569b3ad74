//! Core domain types: tasks, run identifiers, orchestration plans

mod plan;
mod run;
mod task;

pub use plan::{ExecutionMode, OrchestrationPlan, SpecialistBrief};
pub use run::RunId;
pub use task::Task;
