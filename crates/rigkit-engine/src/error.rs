//! Errors the engine facade can surface, wrapping every component-local
//! error plus the two facade-level invariants the type system cannot
//! enforce across process boundaries (SPEC_FULL.md §7, spec.md §6.5).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Discovery.Failed: {0}")]
    Discovery(#[from] rigkit_catalog::DiscoveryError),

    #[error(transparent)]
    Scheduler(#[from] rigkit_scheduler::SchedulerError),

    #[error(
        "Plan.InputOverride.NotAllowed: a plan run does not accept case-input or node-input overrides"
    )]
    PlanInputOverrideNotAllowed,
}

impl EngineError {
    /// True for every validation-category error: these abort before any
    /// runner process is invoked (spec.md §7, exit code 2).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        match self {
            Self::Discovery(_) | Self::PlanInputOverrideNotAllowed => true,
            Self::Scheduler(e) => e.is_validation_error(),
        }
    }
}
