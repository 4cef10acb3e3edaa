//! Atomic file writes: temp file + fsync + rename.
//!
//! Used everywhere a run-folder artifact must never be observed half-written
//! (SPEC_FULL.md §4.9 — `result.json`, index lines, manifest snapshots).

use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

use crate::error::AtomicWriteError;

/// Outcome of an atomic write, surfaced so callers can log anomalies without
/// treating them as failures.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Number of rename retries needed (Windows only; always 0 elsewhere).
    pub rename_retry_count: u32,
    pub warnings: Vec<String>,
}

/// Write `content` to `path` atomically: write to a sibling temp file, fsync,
/// then rename into place. The target is never visible in a partially-written
/// state.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult, AtomicWriteError> {
    let mut result = AtomicWriteResult::default();
    let normalized = normalize_line_endings(content);

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(temp_dir).map_err(|source| AtomicWriteError::CreateDir {
        path: path.to_string(),
        source,
    })?;

    let mut temp_file = NamedTempFile::new_in(temp_dir).map_err(|source| AtomicWriteError::TempFile {
        path: path.to_string(),
        source,
    })?;

    temp_file
        .write_all(normalized.as_bytes())
        .map_err(|source| AtomicWriteError::Write {
            path: path.to_string(),
            source,
        })?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|source| AtomicWriteError::Write {
            path: path.to_string(),
            source,
        })?;

    let retry_count = atomic_rename(temp_file, path)?;
    result.rename_retry_count = retry_count;
    if retry_count > 0 {
        result
            .warnings
            .push(format!("rename required {retry_count} retries due to transient filesystem locks"));
    }

    Ok(result)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Utf8Path) -> Result<u32, AtomicWriteError> {
    use std::io::ErrorKind;
    use std::{thread, time::Duration};

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;

    let mut retry_count = 0;
    loop {
        match temp_file.persist(target.as_std_path()) {
            Ok(_) => return Ok(retry_count),
            Err(persist_error) => {
                let retryable = matches!(
                    persist_error.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !retryable || retry_count >= MAX_RETRIES {
                    return Err(AtomicWriteError::Rename {
                        path: target.to_string(),
                        source: persist_error.error,
                    });
                }
                thread::sleep(Duration::from_millis(INITIAL_DELAY_MS * 2_u64.pow(retry_count)));
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Utf8Path) -> Result<u32, AtomicWriteError> {
    temp_file
        .persist(target.as_std_path())
        .map(|_| 0)
        .map_err(|e| AtomicWriteError::Rename {
            path: target.to_string(),
            source: e.error,
        })
}
