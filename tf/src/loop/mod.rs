//! Tool loop - the per-specialist LLM/tool cycle

mod engine;

pub use engine::{LoopResult, ToolLoop};
