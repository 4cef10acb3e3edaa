//! One run's exclusively-owned directory and its typed artifact writers
//! (spec.md §6.1).

use std::fs::{self, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use rigkit_runner::RunnerResult;
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create run folder at {path}: {source}")]
    CreateDir { path: Utf8PathBuf, source: std::io::Error },

    #[error("failed to write artifact {path}: {source}")]
    Write { path: Utf8PathBuf, source: std::io::Error },

    #[error("failed to serialize artifact for {path}: {source}")]
    Serialize { path: Utf8PathBuf, source: serde_json::Error },

    #[error(transparent)]
    Atomic(#[from] rigkit_utils::error::AtomicWriteError),
}

/// A single line of the structured `events.jsonl` file (spec.md §4.9(e)).
/// Every variant carries its own timestamp; ordering in the file is write
/// order, which is also causal order (spec.md §5).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    RunPlanned {
        at: DateTime<Utc>,
        run_id: String,
        run_type: String,
        planned_nodes: Json,
    },
    NodeStarted {
        at: DateTime<Utc>,
        run_id: String,
        node_id: String,
    },
    NodeFinished {
        at: DateTime<Utc>,
        run_id: String,
        node_id: String,
        status: String,
    },
    RunFinished {
        at: DateTime<Utc>,
        run_id: String,
        status: String,
    },
    Warning {
        at: DateTime<Utc>,
        code: String,
        message: String,
    },
}

/// One line of `children.jsonl`: a terminal summary of a child run, appended
/// as each child settles (spec.md §4.9(d)).
#[derive(Debug, Clone, Serialize)]
pub struct ChildSummary {
    pub run_id: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_version: Option<String>,
    pub status: String,
    pub retry_count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// The filesystem directory backing one run, exclusively owned by the
/// scheduler frame that created it (spec.md §5).
#[derive(Debug, Clone)]
pub struct RunFolder {
    path: Utf8PathBuf,
}

impl RunFolder {
    /// Create `runs_root/run_id/` and its `artifacts/` subdirectory eagerly,
    /// before the run starts (spec.md §4.9(a)).
    pub fn create(runs_root: &Utf8Path, run_id: &str) -> Result<Self, ArtifactError> {
        let path = runs_root.join(run_id);
        fs::create_dir_all(path.join("artifacts")).map_err(|source| ArtifactError::CreateDir {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    #[must_use]
    pub fn artifacts_dir(&self) -> Utf8PathBuf {
        self.path.join("artifacts")
    }

    #[must_use]
    pub fn stdout_path(&self) -> Utf8PathBuf {
        self.path.join("stdout.log")
    }

    #[must_use]
    pub fn stderr_path(&self) -> Utf8PathBuf {
        self.path.join("stderr.log")
    }

    fn write_json_document(&self, file_name: &str, value: &Json) -> Result<(), ArtifactError> {
        let path = self.path.join(file_name);
        let content = serde_json::to_string_pretty(value)
            .map_err(|source| ArtifactError::Serialize { path: path.clone(), source })?;
        rigkit_utils::atomic_write::write_file_atomic(&path, &content)?;
        Ok(())
    }

    /// Write `manifest.json`: a snapshot of the resolved descriptor.
    pub fn write_manifest(&self, manifest: &Json) -> Result<(), ArtifactError> {
        self.write_json_document("manifest.json", manifest)
    }

    /// Write `params.json`: the redacted effective inputs.
    pub fn write_params(&self, redacted_inputs: &Json) -> Result<(), ArtifactError> {
        self.write_json_document("params.json", redacted_inputs)
    }

    /// Write `env.json`: the redacted effective environment.
    pub fn write_env(&self, redacted_env: &Json) -> Result<(), ArtifactError> {
        self.write_json_document("env.json", redacted_env)
    }

    /// Write `result.json` atomically (temp file + rename): the final run
    /// result, never observed half-written (spec.md §4.9(c), §9).
    pub fn write_result_atomic(&self, result: &RunnerResult) -> Result<(), ArtifactError> {
        let path = self.path.join("result.json");
        let content = serde_json::to_string_pretty(result)
            .map_err(|source| ArtifactError::Serialize { path: path.clone(), source })?;
        rigkit_utils::atomic_write::write_file_atomic(&path, &content)?;
        Ok(())
    }

    fn append_jsonl(&self, file_name: &str, line: &str) -> Result<(), ArtifactError> {
        let path = self.path.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ArtifactError::Write { path: path.clone(), source })?;
        writeln!(file, "{line}").map_err(|source| ArtifactError::Write { path, source })
    }

    /// Append one structured event to `events.jsonl`. Must be called from
    /// the scheduler's single thread of control to preserve the total-order
    /// guarantee (spec.md §5, §9's reporter back-pressure note).
    pub fn append_event(&self, event: &EngineEvent) -> Result<(), ArtifactError> {
        let line = serde_json::to_string(event)
            .map_err(|source| ArtifactError::Serialize { path: self.path.join("events.jsonl"), source })?;
        self.append_jsonl("events.jsonl", &line)
    }

    /// Append one child summary to `children.jsonl`. Only present for
    /// suite/plan runs (spec.md §4.9(d)).
    pub fn append_child(&self, child: &ChildSummary) -> Result<(), ArtifactError> {
        let line = serde_json::to_string(child)
            .map_err(|source| ArtifactError::Serialize { path: self.path.join("children.jsonl"), source })?;
        self.append_jsonl("children.jsonl", &line)
    }
}
