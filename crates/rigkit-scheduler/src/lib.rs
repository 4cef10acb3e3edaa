//! Hierarchical case/suite/plan state machines: retry, cancellation, and
//! status aggregation (SPEC_FULL.md §4.8 / spec.md §4.8).
//!
//! [`SchedulerContext`] carries every dependency shared across a whole
//! engine invocation (the catalog, the artifact roots, the runner and its
//! command factory, the privilege probe, the reporter bus, cancellation, and
//! the shared secret redactor). [`case`] and [`suite`] and [`plan`] each
//! take a narrower slice of it — [`case::CaseExecutionContext`] in
//! particular drops the catalog and elevation probe, since by the time a
//! case attempt runs, [`case::prepare_case`] has already consumed both.

pub mod aggregate;
pub mod case;
pub mod error;
pub mod plan;
pub mod suite;

use std::cell::RefCell;

use camino::Utf8Path;
use rigkit_catalog::Catalog;
use rigkit_privilege::ElevationProbe;
use rigkit_redact::SecretRedactor;
use rigkit_report::ReporterBus;
use rigkit_runner::{CaseRunner, RunnerCommandFactory};
use rigkit_utils::CancellationToken;

pub use error::SchedulerError;

/// Every dependency one `RunRequest` needs, for however many levels of the
/// case/suite/plan hierarchy it touches.
pub struct SchedulerContext<'a> {
    pub catalog: &'a Catalog,
    pub runs_root: &'a Utf8Path,
    pub engine_version: &'a str,
    pub runner: &'a dyn CaseRunner,
    pub command_factory: &'a dyn RunnerCommandFactory,
    pub elevation_probe: &'a dyn ElevationProbe,
    pub reporter: &'a dyn ReporterBus,
    pub cancel: &'a CancellationToken,
    pub redactor: &'a RefCell<SecretRedactor>,
    pub default_timeout_sec: u64,
}

impl<'a> SchedulerContext<'a> {
    /// Project down to the narrower set of dependencies a single case
    /// attempt needs once its reference, inputs, and privilege outcome are
    /// already resolved.
    pub fn case_ctx(&self) -> case::CaseExecutionContext<'a> {
        case::CaseExecutionContext {
            runs_root: self.runs_root,
            engine_version: self.engine_version,
            runner: self.runner,
            command_factory: self.command_factory,
            reporter: self.reporter,
            cancel: self.cancel,
            redactor: self.redactor,
        }
    }
}
