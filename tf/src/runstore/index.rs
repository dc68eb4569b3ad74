//! Cross-run semantic index
//!
//! One JSON object per line in `<workspace_root>/run_index.jsonl`, append-only.
//! Appends are serialized through a process-wide async mutex rather than
//! relying on filesystem append atomicity. Search is best-effort semantic
//! (cosine over embedded entries) with an always-available keyword fallback.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::RunId;
use crate::embed::{Embedder, cosine_similarity};

/// Index file name under the workspace root
pub const INDEX_FILE: &str = "run_index.jsonl";

/// Maximum stored prompt prefix length
const PROMPT_PREFIX_CAP: usize = 200;

/// One completed run's index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIndexEntry {
    pub run_id: RunId,
    pub specialist_ids: Vec<String>,
    pub prompt_prefix: String,
    pub finish_summary: String,
    pub timestamp: DateTime<Utc>,
    pub workspace_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Append-only cross-run index with semantic + keyword search
pub struct RunIndex {
    path: PathBuf,
    embedder: Option<Arc<dyn Embedder>>,
    append_lock: Mutex<()>,
}

impl RunIndex {
    pub fn new(workspace_root: &Path, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            path: workspace_root.join(INDEX_FILE),
            embedder,
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry for a completed run
    ///
    /// The prompt prefix is clamped to 200 chars; the embedding is computed
    /// from `prompt_prefix + finish_summary` when an embedder is configured,
    /// and silently omitted when embedding fails.
    pub async fn append(
        &self,
        run_id: RunId,
        specialist_ids: Vec<String>,
        prompt: &str,
        finish_summary: &str,
        workspace_path: PathBuf,
    ) -> Result<RunIndexEntry> {
        let prompt_prefix: String = prompt.chars().take(PROMPT_PREFIX_CAP).collect();

        let embedding = match &self.embedder {
            Some(embedder) => {
                let text = format!("{} {}", prompt_prefix, finish_summary);
                match embedder.embed(&text).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(error = %e, "RunIndex: embedding failed, storing entry without one");
                        None
                    }
                }
            }
            None => None,
        };

        let entry = RunIndexEntry {
            run_id,
            specialist_ids,
            prompt_prefix,
            finish_summary: finish_summary.to_string(),
            timestamp: Utc::now(),
            workspace_path,
            embedding,
        };

        let line = serde_json::to_string(&entry)?;
        {
            let _guard = self.append_lock.lock().await;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .context("Failed to open run index")?;
            writeln!(file, "{}", line)?;
            file.flush()?;
        }
        debug!(run_id = %entry.run_id, has_embedding = entry.embedding.is_some(), "RunIndex: appended entry");
        Ok(entry)
    }

    /// Load all entries, skipping unparseable lines
    pub fn load(&self) -> Result<Vec<RunIndexEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunIndexEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "RunIndex: skipping unparseable line"),
            }
        }
        Ok(entries)
    }

    /// Search entries: cosine similarity over embedded entries when possible,
    /// lowercase keyword matching over all entries otherwise
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RunIndexEntry>> {
        let entries = self.load()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let any_embedded = entries.iter().any(|e| e.embedding.is_some());
        if any_embedded && let Some(embedder) = &self.embedder {
            match embedder.embed(query).await {
                Ok(query_embedding) => {
                    return Ok(rank_by_cosine(entries, &query_embedding, top_k));
                }
                Err(e) => {
                    warn!(error = %e, "RunIndex: query embedding failed, falling back to keywords");
                }
            }
        }

        Ok(rank_by_keywords(entries, query, top_k))
    }
}

fn rank_by_cosine(entries: Vec<RunIndexEntry>, query: &[f32], top_k: usize) -> Vec<RunIndexEntry> {
    let mut scored: Vec<(f32, RunIndexEntry)> = entries
        .into_iter()
        .filter_map(|entry| {
            let score = entry.embedding.as_ref().map(|e| cosine_similarity(e, query))?;
            Some((score, entry))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(top_k).map(|(_, entry)| entry).collect()
}

fn rank_by_keywords(entries: Vec<RunIndexEntry>, query: &str, top_k: usize) -> Vec<RunIndexEntry> {
    let terms: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_string).collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, RunIndexEntry)> = entries
        .into_iter()
        .filter_map(|entry| {
            let haystack = format!(
                "{} {}",
                entry.prompt_prefix.to_lowercase(),
                entry.finish_summary.to_lowercase()
            );
            let count: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
            (count > 0).then_some((count, entry))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::mock::{MockEmbedder, UnreachableEmbedder};
    use tempfile::tempdir;

    async fn append_entry(index: &RunIndex, prompt: &str, summary: &str) -> RunIndexEntry {
        index
            .append(
                RunId::generate(),
                vec!["engineering".to_string()],
                prompt,
                summary,
                PathBuf::from("/tmp/ws"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_clamps_prompt_prefix() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), None);

        let long_prompt = "x".repeat(500);
        let entry = append_entry(&index, &long_prompt, "done").await;
        assert_eq!(entry.prompt_prefix.chars().count(), 200);
    }

    #[tokio::test]
    async fn test_append_without_embedder_omits_embedding() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), None);

        let entry = append_entry(&index, "build a parser", "built").await;
        assert!(entry.embedding.is_none());

        // The omitted field is absent on the wire
        let content = fs::read_to_string(index.path()).unwrap();
        assert!(!content.contains("embedding"));
    }

    #[tokio::test]
    async fn test_serialize_roundtrip_identity() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), Some(Arc::new(MockEmbedder)));

        let written = append_entry(&index, "implement auth", "auth implemented").await;
        let loaded = index.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].run_id, written.run_id);
        assert_eq!(loaded[0].prompt_prefix, written.prompt_prefix);
        let a = written.embedding.as_ref().unwrap();
        let b = loaded[0].embedding.as_ref().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_semantic_search_ranks_by_cosine() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), Some(Arc::new(MockEmbedder)));

        append_entry(&index, "implement authentication flow", "auth done").await;
        append_entry(&index, "fix the billing report", "billing fixed").await;

        let results = index.search("implement authentication flow", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].prompt_prefix.contains("authentication"));
    }

    #[tokio::test]
    async fn test_keyword_fallback_when_embedder_unreachable() {
        let temp = tempdir().unwrap();

        // Entries written while the embedder worked
        let index = RunIndex::new(temp.path(), Some(Arc::new(MockEmbedder)));
        append_entry(&index, "implement authentication", "auth done").await;
        append_entry(&index, "refactor storage layer", "storage refactored").await;

        // Entries written after it went away
        let degraded = RunIndex::new(temp.path(), None);
        append_entry(&degraded, "authentication token bug", "fixed token handling").await;

        // Search with an unreachable embedder: keyword fallback over all
        // entries, embedded or not
        let searching = RunIndex::new(temp.path(), Some(Arc::new(UnreachableEmbedder)));
        let results = searching.search("authentication", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        for entry in &results {
            assert!(entry.prompt_prefix.contains("authentication"));
        }
    }

    #[tokio::test]
    async fn test_keyword_search_without_any_embeddings() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), None);

        append_entry(&index, "write docs for the api", "docs written").await;
        append_entry(&index, "api docs docs docs", "more docs").await;

        let results = index.search("docs", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        // Higher match count ranks first
        assert!(results[0].prompt_prefix.contains("docs docs"));
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), None);
        assert!(index.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_is_append_only() {
        let temp = tempdir().unwrap();
        let index = RunIndex::new(temp.path(), None);

        append_entry(&index, "one", "1").await;
        append_entry(&index, "two", "2").await;

        let content = fs::read_to_string(index.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
