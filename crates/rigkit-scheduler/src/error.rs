//! Errors the scheduler can surface. Validation failures (reference,
//! inputs, privilege) are distinguished from artifact I/O failures so the
//! caller can map them to the right exit code (SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Catalog.NotFound: {entity_type} '{identity}' is not in the catalog")]
    NotFound { entity_type: &'static str, identity: String },

    #[error(transparent)]
    Reference(#[from] rigkit_resolve::ReferenceError),

    #[error(transparent)]
    Inputs(#[from] rigkit_inputs::InputError),

    #[error(transparent)]
    Privilege(#[from] rigkit_privilege::PrivilegeError),

    #[error(transparent)]
    Manifest(#[from] rigkit_manifest::ManifestError),

    #[error(transparent)]
    Env(#[from] rigkit_env::EnvError),

    #[error(transparent)]
    Artifact(#[from] rigkit_artifacts::ArtifactError),
}

impl SchedulerError {
    /// True for every validation-category error: these abort the run before
    /// any runner process is invoked (spec.md §7).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::Artifact(_))
    }
}
