//! Run identifiers
//!
//! A RunId doubles as the run's directory name under `<workspace_root>/runs/`,
//! so it must stay filesystem-safe and sortable by creation time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a run, generated at run creation
///
/// Format: `YYYYMMDD-HHMMSS-<uuid7 suffix>`. The timestamp prefix keeps
/// directory listings chronological; the uuid suffix prevents collisions
/// between runs created in the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run id
    pub fn generate() -> Self {
        let ts = Utc::now().format("%Y%m%d-%H%M%S");
        let suffix = Uuid::now_v7().simple().to_string();
        Self(format!("{}-{}", ts, &suffix[..12]))
    }

    /// Wrap an existing id (e.g. parsed from a directory name)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
