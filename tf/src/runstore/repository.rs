//! Run directories and the append-only runlog

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use eyre::{Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::RunId;
use crate::events::{EventKind, EventQueue, RunEvent, StreamMessage};

/// Runlog file name inside a run directory
pub const RUNLOG_FILE: &str = "runlog.jsonl";

/// Creates run directories under `<workspace_root>/runs/`
pub struct RunRepository {
    workspace_root: PathBuf,
}

/// A freshly created (or reopened) run directory
#[derive(Debug, Clone)]
pub struct CreatedRun {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub workspace: PathBuf,
}

impl RunRepository {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.workspace_root.join("runs")
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir().join(run_id.as_str())
    }

    /// Create a new run directory with its tool workspace ready
    pub fn create_run(&self) -> Result<CreatedRun> {
        let run_id = RunId::generate();
        let run_dir = self.run_dir(&run_id);
        let workspace = run_dir.join("workspace");
        fs::create_dir_all(&workspace).context("Failed to create run workspace")?;
        debug!(run_id = %run_id, ?run_dir, "RunRepository: created run directory");
        Ok(CreatedRun {
            run_id,
            run_dir,
            workspace,
        })
    }

    /// Reopen an existing run directory (resume path)
    pub fn open_run(&self, run_id: &RunId) -> Result<CreatedRun> {
        let run_dir = self.run_dir(run_id);
        if !run_dir.is_dir() {
            eyre::bail!("Run {} not found under {}", run_id, self.runs_dir().display());
        }
        let workspace = run_dir.join("workspace");
        fs::create_dir_all(&workspace)?;
        Ok(CreatedRun {
            run_id: run_id.clone(),
            run_dir,
            workspace,
        })
    }
}

struct LogInner {
    writer: BufWriter<File>,
    seq: u64,
}

/// Append-only JSONL event log for one run
///
/// Appends are totally ordered by an async mutex; timestamps are monotonic
/// seconds since the log was opened. When an event queue is attached, every
/// appended event is also pushed there (best-effort).
pub struct RunLog {
    path: PathBuf,
    inner: Mutex<LogInner>,
    started: Instant,
    queue: Option<Arc<EventQueue>>,
    fsync: bool,
}

impl RunLog {
    /// Open (or create) the runlog in `run_dir`, continuing the sequence
    /// numbering of any existing log
    pub fn open(run_dir: &Path, queue: Option<Arc<EventQueue>>, fsync: bool) -> Result<Self> {
        let path = run_dir.join(RUNLOG_FILE);
        let next_seq = if path.exists() {
            read_runlog(&path)?.last().map(|e| e.seq + 1).unwrap_or(0)
        } else {
            0
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open runlog")?;

        Ok(Self {
            path,
            inner: Mutex::new(LogInner {
                writer: BufWriter::new(file),
                seq: next_seq,
            }),
            started: Instant::now(),
            queue,
            fsync,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event; returns the recorded event
    pub async fn append(&self, kind: EventKind, step: Option<String>, payload: Value) -> Result<RunEvent> {
        let mut inner = self.inner.lock().await;
        let event = RunEvent {
            ts: self.started.elapsed().as_secs_f64(),
            seq: inner.seq,
            kind,
            step,
            payload,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(inner.writer, "{}", line)?;
        inner.writer.flush()?;
        if self.fsync {
            inner.writer.get_ref().sync_all()?;
        }
        inner.seq += 1;
        drop(inner);

        debug!(kind = kind.as_str(), seq = event.seq, "RunLog: appended event");
        if let Some(queue) = &self.queue {
            queue.push(StreamMessage::Event(event.clone()));
        }
        Ok(event)
    }

    /// Enqueue a closing sentinel for streaming consumers (not persisted)
    pub fn push_sentinel(&self, message: StreamMessage) {
        if let Some(queue) = &self.queue {
            queue.push(message);
        }
    }
}

/// Parse a runlog, skipping unparseable lines
pub fn read_runlog(path: &Path) -> Result<Vec<RunEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).context("Failed to read runlog")?;
    let mut events = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => warn!(line, error = %e, "read_runlog: failed to parse line"),
        }
    }
    Ok(events)
}

/// Run status derived from the last runlog event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Running,
    NotFound,
}

/// Derive a run's status from its runlog
pub fn run_status(run_dir: &Path) -> RunStatus {
    let path = run_dir.join(RUNLOG_FILE);
    if !path.exists() {
        return RunStatus::NotFound;
    }
    match read_runlog(&path) {
        Ok(events) if events.iter().any(|e| e.kind == EventKind::RunComplete) => RunStatus::Completed,
        Ok(events) if events.is_empty() => RunStatus::NotFound,
        Ok(_) => RunStatus::Running,
        Err(_) => RunStatus::NotFound,
    }
}
