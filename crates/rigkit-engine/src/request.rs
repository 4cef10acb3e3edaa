//! `RunRequest` (SPEC_FULL.md §6, spec.md §6.4).
//!
//! The "exactly one of suite/testCase/plan" invariant from spec.md §6.4 is
//! encoded in the type, not validated at runtime: there is no public way to
//! build a [`RunRequest`] that names more than one target, because the only
//! constructors are [`RunRequest::for_case`], [`RunRequest::for_suite`], and
//! [`RunRequest::for_plan`], each producing one variant of the private
//! [`RunTarget`] enum. Likewise `caseInputs` only exists on the `for_case`
//! constructor and `nodeOverrides` only on `for_suite`'s — a plan request
//! has no way to carry either, which is the type-level side of
//! `Plan.InputOverride.NotAllowed`.

use std::collections::BTreeMap;

use rigkit_manifest::{Identity, RawInput};

pub(crate) enum RunTarget {
    Case { identity: Identity, case_inputs: Option<BTreeMap<String, RawInput>> },
    Suite { identity: Identity, node_overrides: Option<BTreeMap<String, BTreeMap<String, RawInput>>> },
    Plan { identity: Identity },
}

/// One `RunRequest`: a run target plus environment overrides, which the
/// spec permits regardless of target kind (spec.md §6.4).
pub struct RunRequest {
    pub(crate) target: RunTarget,
    pub(crate) environment_overrides: Option<BTreeMap<String, String>>,
}

impl RunRequest {
    #[must_use]
    pub fn for_case(
        identity: Identity,
        case_inputs: Option<BTreeMap<String, RawInput>>,
        environment_overrides: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self { target: RunTarget::Case { identity, case_inputs }, environment_overrides }
    }

    #[must_use]
    pub fn for_suite(
        identity: Identity,
        node_overrides: Option<BTreeMap<String, BTreeMap<String, RawInput>>>,
        environment_overrides: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self { target: RunTarget::Suite { identity, node_overrides }, environment_overrides }
    }

    #[must_use]
    pub fn for_plan(identity: Identity, environment_overrides: Option<BTreeMap<String, String>>) -> Self {
        Self { target: RunTarget::Plan { identity }, environment_overrides }
    }
}
