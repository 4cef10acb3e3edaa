//! Resolves a suite node's case reference (or a plan node's suite
//! reference) to a concrete catalog entity (SPEC_FULL.md §4.3).

use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use rigkit_catalog::{Catalog, SUITE_MANIFEST_FILE};
use rigkit_manifest::{Identity, SuiteDescriptor, TestCaseDescriptor};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    OutOfRoot,
    NotFound,
    MissingManifest,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OutOfRoot => "OutOfRoot",
            Self::NotFound => "NotFound",
            Self::MissingManifest => "MissingManifest",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
#[error("Reference.Invalid({reason}): reference '{reference}' resolved to '{resolved}'")]
pub struct ReferenceError {
    pub reason: InvalidReason,
    pub reference: String,
    pub resolved: Utf8PathBuf,
}

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem. Used before containment checks so a reference
/// that never existed still gets a deterministic resolved path to report.
fn normalize_lexical(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component.as_str() {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve symlinks if the path exists; otherwise fall back to the lexical
/// normalization so a `NotFound` reference can still be reported with a
/// concrete resolved path.
fn resolve_real_or_lexical(path: &Utf8Path) -> Utf8PathBuf {
    match fs::canonicalize(path) {
        Ok(canon) => Utf8PathBuf::from_path_buf(canon).unwrap_or_else(|_| normalize_lexical(path)),
        Err(_) => normalize_lexical(path),
    }
}

fn is_identity_form(reference: &str) -> bool {
    !reference.contains('/') && !reference.contains('\\') && reference.contains('@')
}

fn containment_check(
    joined: &Utf8Path,
    root: &Utf8Path,
    reference: &str,
) -> Result<Utf8PathBuf, ReferenceError> {
    let resolved_root = resolve_real_or_lexical(root);
    let resolved = resolve_real_or_lexical(joined);
    if !resolved.starts_with(&resolved_root) {
        return Err(ReferenceError {
            reason: InvalidReason::OutOfRoot,
            reference: reference.to_string(),
            resolved,
        });
    }
    if !resolved.exists() {
        return Err(ReferenceError {
            reason: InvalidReason::NotFound,
            reference: reference.to_string(),
            resolved,
        });
    }
    Ok(resolved)
}

/// Resolve a suite node's `ref` field to the test case it names.
///
/// `reference` is either an `id@version` identity (resolved via catalog
/// lookup) or a path relative to `suite_folder` (resolved via the
/// filesystem, with a containment check against `cases_root`).
pub fn resolve_case_reference(
    reference: &str,
    suite_folder: &Utf8Path,
    cases_root: &Utf8Path,
    catalog: &Catalog,
) -> Result<Identity, ReferenceError> {
    if is_identity_form(reference) {
        let identity = Identity::from_str(reference).map_err(|_| ReferenceError {
            reason: InvalidReason::NotFound,
            reference: reference.to_string(),
            resolved: cases_root.to_path_buf(),
        })?;
        return catalog
            .cases
            .get(&identity)
            .map(|_| identity.clone())
            .ok_or(ReferenceError {
                reason: InvalidReason::NotFound,
                reference: reference.to_string(),
                resolved: cases_root.to_path_buf(),
            });
    }

    let joined = normalize_lexical(&suite_folder.join(reference));
    let resolved = containment_check(&joined, cases_root, reference)?;

    let manifest_path = resolved.join(rigkit_catalog::CASE_MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(ReferenceError {
            reason: InvalidReason::MissingManifest,
            reference: reference.to_string(),
            resolved,
        });
    }

    let content = fs::read_to_string(&manifest_path).map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved: resolved.clone(),
    })?;
    let descriptor = TestCaseDescriptor::parse(&content).map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved: resolved.clone(),
    })?;
    descriptor.identity().map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved,
    })
}

/// Resolve a plan node's `ref` field to the suite it names. Analogous to
/// [`resolve_case_reference`] but against `suites_root`.
pub fn resolve_suite_reference(
    reference: &str,
    plan_folder: &Utf8Path,
    suites_root: &Utf8Path,
    catalog: &Catalog,
) -> Result<Identity, ReferenceError> {
    if is_identity_form(reference) {
        let identity = Identity::from_str(reference).map_err(|_| ReferenceError {
            reason: InvalidReason::NotFound,
            reference: reference.to_string(),
            resolved: suites_root.to_path_buf(),
        })?;
        return catalog
            .suites
            .get(&identity)
            .map(|_| identity.clone())
            .ok_or(ReferenceError {
                reason: InvalidReason::NotFound,
                reference: reference.to_string(),
                resolved: suites_root.to_path_buf(),
            });
    }

    let joined = normalize_lexical(&plan_folder.join(reference));
    let resolved = containment_check(&joined, suites_root, reference)?;

    let manifest_path = resolved.join(SUITE_MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(ReferenceError {
            reason: InvalidReason::MissingManifest,
            reference: reference.to_string(),
            resolved,
        });
    }

    let content = fs::read_to_string(&manifest_path).map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved: resolved.clone(),
    })?;
    let descriptor = SuiteDescriptor::parse(&content).map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved: resolved.clone(),
    })?;
    descriptor.identity().map_err(|_| ReferenceError {
        reason: InvalidReason::MissingManifest,
        reference: reference.to_string(),
        resolved,
    })
}
