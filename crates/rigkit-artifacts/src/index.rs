//! `runsRoot/index.jsonl`: the append-only, process-exclusive-locked global
//! runs index (spec.md §4.9(b)/(c), §6.3, §5).

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};

use crate::run_folder::ArtifactError;

/// One line of `index.jsonl` (spec.md §6.3). Readers that see the same
/// `runId` twice keep the later record (last-wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub run_id: String,
    pub run_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Handle onto `runsRoot/index.jsonl`. Every append acquires an exclusive
/// advisory lock on the index file for the duration of the write, the same
/// `fd_lock::RwLock::try_write` pattern the teacher's lockfile module uses
/// for its own single-writer file (spec.md §5: "written under an exclusive
/// per-process lock").
#[derive(Debug, Clone)]
pub struct RunsIndex {
    path: Utf8PathBuf,
}

impl RunsIndex {
    #[must_use]
    pub fn new(runs_root: &Utf8Path) -> Self {
        Self { path: runs_root.join("index.jsonl") }
    }

    /// Append one line, holding the exclusive lock only for the write.
    /// Called once when a run begins (fields beyond `run_id`/`run_type`/
    /// `start_time` set, `end_time`/`status` absent) and again when it
    /// terminates (same `run_id`, now with `end_time`/`status`); readers
    /// apply last-wins semantics.
    pub fn append(&self, entry: &IndexEntry) -> Result<(), ArtifactError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(self.path.as_std_path())
            .map_err(|source| ArtifactError::Write { path: self.path.clone(), source })?;

        let mut lock = RwLock::new(file);
        let mut guard = lock.try_write().map_err(|source| ArtifactError::Write {
            path: self.path.clone(),
            source,
        })?;

        let line = serde_json::to_string(entry)
            .map_err(|source| ArtifactError::Serialize { path: self.path.clone(), source })?;
        writeln!(guard, "{line}").map_err(|source| ArtifactError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Read the index and apply last-wins-by-`run_id` semantics, returning
    /// only entries that reached a terminal state (`status` and `end_time`
    /// both present).
    pub fn read_terminal_states(&self) -> Result<Vec<IndexEntry>, ArtifactError> {
        let Ok(file) = std::fs::File::open(self.path.as_std_path()) else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(file);
        let mut by_run_id: std::collections::BTreeMap<String, IndexEntry> = std::collections::BTreeMap::new();
        for line in reader.lines() {
            let line = line.map_err(|source| ArtifactError::Write { path: self.path.clone(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<IndexEntry>(&line) {
                by_run_id.insert(entry.run_id.clone(), entry);
            }
        }
        Ok(by_run_id
            .into_values()
            .filter(|e| e.status.is_some() && e.end_time.is_some())
            .collect())
    }
}
