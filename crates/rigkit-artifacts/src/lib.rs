//! Run-folder layout, atomic artifact writes, and the append-only JSONL
//! runs index (SPEC_FULL.md §4.9 / spec.md §4.9, §6.1, §6.3).

pub mod index;
pub mod run_folder;

pub use index::{IndexEntry, RunsIndex};
pub use run_folder::{ArtifactError, ChildSummary, EngineEvent, RunFolder};
