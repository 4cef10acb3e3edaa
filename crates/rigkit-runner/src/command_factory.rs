//! Maps a resolved test case to the [`CommandSpec`] that spawns its script
//! runner (SPEC_FULL.md §4.7). The script language itself is an explicit
//! non-goal (spec.md §1), so the engine never guesses an interpreter or a
//! script file extension from the case folder — it always goes through a
//! configured executable, keeping the interpreter choice entirely external.

use camino::Utf8Path;

use crate::command_spec::CommandSpec;

/// Builds the [`CommandSpec`] used to spawn one case's runner process.
pub trait RunnerCommandFactory: Send + Sync {
    fn command_for(&self, case_folder: &Utf8Path, run_folder: &Utf8Path) -> CommandSpec;
}

/// The default factory: invokes a single configured executable, passing the
/// run folder and the case folder as positional arguments. The executable
/// reads the invocation document (spec.md §6.2) from stdin.
#[derive(Debug, Clone)]
pub struct ConfiguredCommandFactory {
    pub executable: std::ffi::OsString,
    pub extra_args: Vec<std::ffi::OsString>,
}

impl ConfiguredCommandFactory {
    #[must_use]
    pub fn new(executable: impl Into<std::ffi::OsString>) -> Self {
        Self { executable: executable.into(), extra_args: Vec::new() }
    }

    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl RunnerCommandFactory for ConfiguredCommandFactory {
    fn command_for(&self, case_folder: &Utf8Path, run_folder: &Utf8Path) -> CommandSpec {
        CommandSpec::new(self.executable.clone())
            .args(self.extra_args.clone())
            .arg(run_folder.as_str())
            .arg(case_folder.as_str())
    }
}
