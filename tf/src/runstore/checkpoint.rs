//! Crash-safe checkpoints and resumable-run discovery
//!
//! A checkpoint exists exactly while its run is unfinished. Writes go through
//! a temp file + fsync + rename so a partial write is never observable; a
//! crash between rename and the next runlog append leaves the run one
//! specialist behind, which resume re-executes (at-least-once semantics).
//!
//! `completed_specialist_ids` is a prefix of the plan's briefs in sequential
//! mode. Parallel runs checkpoint the empty prefix and resume re-runs all
//! members.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{OrchestrationPlan, RunId, Task};
use crate::events::EventKind;

use super::repository::{RUNLOG_FILE, read_runlog};

/// Checkpoint file name inside a run directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Latest completion state of an unfinished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub task: Task,
    pub plan: OrchestrationPlan,
    pub completed_specialist_ids: Vec<String>,
    pub last_finish_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Initial checkpoint written right after run-directory creation
    pub fn initial(run_id: RunId, task: Task, plan: OrchestrationPlan) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            task,
            plan,
            completed_specialist_ids: Vec::new(),
            last_finish_payload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a specialist's completion
    pub fn record_completion(&mut self, specialist_id: &str, finish_payload: Value) {
        self.completed_specialist_ids.push(specialist_id.to_string());
        self.last_finish_payload = Some(finish_payload);
        self.updated_at = Utc::now();
    }

    pub fn path_in(run_dir: &Path) -> PathBuf {
        run_dir.join(CHECKPOINT_FILE)
    }

    /// Write atomically: temp file, fsync, rename
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        let final_path = Self::path_in(run_dir);
        let tmp_path = run_dir.join(format!("{}.tmp", CHECKPOINT_FILE));

        let json = serde_json::to_string_pretty(self)?;
        {
            let mut file = File::create(&tmp_path).context("Failed to create checkpoint temp file")?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path).context("Failed to rename checkpoint into place")?;
        debug!(run_id = %self.run_id, completed = self.completed_specialist_ids.len(), "Checkpoint: saved");
        Ok(())
    }

    /// Load a checkpoint, None when the run has none
    pub fn load(run_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(run_dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).context("Failed to read checkpoint")?;
        let checkpoint = serde_json::from_str(&content).context("Failed to parse checkpoint")?;
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint (terminal success path)
    pub fn delete(run_dir: &Path) -> Result<()> {
        let path = Self::path_in(run_dir);
        if path.exists() {
            fs::remove_file(&path).context("Failed to delete checkpoint")?;
        }
        Ok(())
    }
}

/// Scan `workspace_root/runs/*/` for resumable runs
///
/// A run is resumable iff it has a checkpoint and its runlog does not contain
/// a `run_complete` event.
pub fn find_resumable(workspace_root: &Path) -> Result<Vec<Checkpoint>> {
    let runs_dir = workspace_root.join("runs");
    if !runs_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut resumable = Vec::new();
    for entry in fs::read_dir(&runs_dir)? {
        let entry = entry?;
        let run_dir = entry.path();
        if !run_dir.is_dir() {
            continue;
        }

        let checkpoint = match Checkpoint::load(&run_dir) {
            Ok(Some(cp)) => cp,
            Ok(None) => continue,
            Err(e) => {
                warn!(?run_dir, error = %e, "find_resumable: skipping unreadable checkpoint");
                continue;
            }
        };

        let events = read_runlog(&run_dir.join(RUNLOG_FILE)).unwrap_or_default();
        if events.iter().any(|e| e.kind == EventKind::RunComplete) {
            continue;
        }

        resumable.push(checkpoint);
    }

    resumable.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(resumable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runstore::{RunLog, RunRepository};
    use tempfile::tempdir;

    fn checkpoint_for(run_id: RunId) -> Checkpoint {
        Checkpoint::initial(
            run_id,
            Task::new("test task"),
            OrchestrationPlan::single("engineering", "test"),
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = tempdir().unwrap();
        let repo = RunRepository::new(temp.path());
        let created = repo.create_run().unwrap();

        let mut checkpoint = checkpoint_for(created.run_id.clone());
        checkpoint.record_completion("engineering", serde_json::json!({"summary": "done"}));
        checkpoint.save(&created.run_dir).unwrap();

        let loaded = Checkpoint::load(&created.run_dir).unwrap().unwrap();
        assert_eq!(loaded.run_id, created.run_id);
        assert_eq!(loaded.completed_specialist_ids, vec!["engineering"]);
        assert_eq!(loaded.last_finish_payload.unwrap()["summary"], "done");
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let repo = RunRepository::new(temp.path());
        let created = repo.create_run().unwrap();

        checkpoint_for(created.run_id.clone()).save(&created.run_dir).unwrap();

        assert!(Checkpoint::path_in(&created.run_dir).exists());
        assert!(!created.run_dir.join("checkpoint.json.tmp").exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = tempdir().unwrap();
        let repo = RunRepository::new(temp.path());
        let created = repo.create_run().unwrap();

        checkpoint_for(created.run_id.clone()).save(&created.run_dir).unwrap();
        Checkpoint::delete(&created.run_dir).unwrap();
        Checkpoint::delete(&created.run_dir).unwrap();
        assert!(Checkpoint::load(&created.run_dir).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_resumable_excludes_completed() {
        let temp = tempdir().unwrap();
        let repo = RunRepository::new(temp.path());

        // Run A: checkpointed, unfinished
        let a = repo.create_run().unwrap();
        checkpoint_for(a.run_id.clone()).save(&a.run_dir).unwrap();

        // Run B: checkpointed but runlog has run_complete (stale checkpoint)
        let b = repo.create_run().unwrap();
        checkpoint_for(b.run_id.clone()).save(&b.run_dir).unwrap();
        let log = RunLog::open(&b.run_dir, None, false).unwrap();
        log.append(EventKind::RunComplete, None, serde_json::json!({})).await.unwrap();

        // Run C: no checkpoint at all
        let _c = repo.create_run().unwrap();

        let resumable = find_resumable(temp.path()).unwrap();
        assert_eq!(resumable.len(), 1);
        assert_eq!(resumable[0].run_id, a.run_id);
    }

    #[test]
    fn test_find_resumable_empty_root() {
        let temp = tempdir().unwrap();
        assert!(find_resumable(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_keeps_latest_state() {
        let temp = tempdir().unwrap();
        let repo = RunRepository::new(temp.path());
        let created = repo.create_run().unwrap();

        let mut checkpoint = checkpoint_for(created.run_id.clone());
        checkpoint.save(&created.run_dir).unwrap();

        checkpoint.record_completion("engineering", serde_json::json!({"summary": "first"}));
        checkpoint.save(&created.run_dir).unwrap();

        let loaded = Checkpoint::load(&created.run_dir).unwrap().unwrap();
        assert_eq!(loaded.completed_specialist_ids.len(), 1);
        assert!(loaded.updated_at >= loaded.created_at);
    }
}
