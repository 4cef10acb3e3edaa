//! Spawns and supervises the external script-runner process for one test
//! case (SPEC_FULL.md §4.7). The runner itself is an external collaborator;
//! this crate only implements the engine's side of the contract.

pub mod command_factory;
pub mod command_spec;
pub mod process;
pub mod result;

pub use command_factory::{ConfiguredCommandFactory, RunnerCommandFactory};
pub use command_spec::CommandSpec;
pub use process::{CaseRunner, ProcessCaseRunner, RunnerInvocation};
pub use result::{ErrorDetail, RunStatus, RunnerResult};
