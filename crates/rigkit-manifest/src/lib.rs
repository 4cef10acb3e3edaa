//! Identity parsing and descriptor models for the catalog's three entity
//! kinds: test cases, suites, and plans.

pub mod identity;
pub mod types;

pub use identity::{EntityType, Identity, IdentityError};
pub use types::{
    EnvReference, ManifestError, ParamType, ParameterDef, PlanDescriptor, Privilege, RawInput,
    SuiteControls, SuiteDescriptor, SuiteNode, TestCaseDescriptor, TestCaseNode, TimeoutPolicy,
    SUPPORTED_SCHEMA_MAJOR,
};
