//! Run persistence: directories, runlogs, checkpoints, and the cross-run index
//!
//! Each run owns a directory under `<workspace_root>/runs/<run_id>/` holding a
//! sandboxed `workspace/`, an append-only `runlog.jsonl`, and (while the run
//! is unfinished) a `checkpoint.json`. A shared `run_index.jsonl` at the
//! workspace root supports cross-run search.

mod checkpoint;
mod index;
mod repository;

pub use checkpoint::{Checkpoint, find_resumable};
pub use index::{RunIndex, RunIndexEntry};
pub use repository::{CreatedRun, RunLog, RunRepository, RunStatus, read_runlog, run_status};
