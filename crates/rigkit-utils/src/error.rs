//! Minimal error types shared by leaf crates that have no business knowing
//! about the engine-wide error taxonomy (that aggregate lives in
//! `rigkit-engine`, which is the only crate that depends on every component).

use thiserror::Error;

/// Errors raised by [`crate::atomic_write`].
#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("failed to create temp file next to {path}: {source}")]
    TempFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write content to temp file for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename temp file into place at {path}: {source}")]
    Rename {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create parent directory for {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
