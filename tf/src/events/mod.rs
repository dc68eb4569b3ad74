//! Runlog event vocabulary and best-effort streaming
//!
//! Every observable action in a run is recorded as a [`RunEvent`] in the
//! run's JSONL log. An optional bounded [`EventQueue`] mirrors events to a
//! streaming consumer; the log is always the authoritative record.

mod queue;
mod types;

pub use queue::EventQueue;
pub use types::{EventKind, RunEvent, StreamMessage};
