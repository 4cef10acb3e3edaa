//! Scans the three asset roots and builds an immutable catalog keyed by
//! identity (SPEC_FULL.md §4.2).

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rigkit_manifest::{
    EntityType, Identity, ManifestError, PlanDescriptor, SuiteDescriptor, TestCaseDescriptor,
};
use thiserror::Error;

pub const CASE_MANIFEST_FILE: &str = "case.json";
pub const SUITE_MANIFEST_FILE: &str = "suite.json";
pub const PLAN_MANIFEST_FILE: &str = "plan.json";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to parse manifest at {path}: {source}")]
    Parse { path: Utf8PathBuf, source: ManifestError },

    #[error("failed to read directory entry under {root}: {source}")]
    ReadDir { root: Utf8PathBuf, source: std::io::Error },

    #[error("failed to read manifest file {path}: {source}")]
    ReadManifest { path: Utf8PathBuf, source: std::io::Error },

    #[error("duplicate {entity_type} identity '{id}@{version}' found at {paths:?}")]
    DuplicateIdentity {
        entity_type: EntityType,
        id: String,
        version: String,
        paths: Vec<Utf8PathBuf>,
    },
}

/// One catalog entry: the parsed descriptor plus where it came from.
#[derive(Debug, Clone)]
pub struct CatalogEntry<D> {
    pub descriptor: D,
    pub manifest_path: Utf8PathBuf,
    pub folder_path: Utf8PathBuf,
}

/// Immutable map from identity to descriptor, for each of the three entity
/// kinds. Rebuilt from scratch on every rediscovery; never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub cases: BTreeMap<Identity, CatalogEntry<TestCaseDescriptor>>,
    pub suites: BTreeMap<Identity, CatalogEntry<SuiteDescriptor>>,
    pub plans: BTreeMap<Identity, CatalogEntry<PlanDescriptor>>,
    pub cases_root: Utf8PathBuf,
    pub suites_root: Utf8PathBuf,
    pub plans_root: Utf8PathBuf,
}

/// Everything produced by one discovery pass: the catalog plus any errors
/// encountered. A descriptor with a parse error is omitted from the catalog
/// rather than aborting the whole scan.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub catalog: Catalog,
    pub errors: Vec<DiscoveryErrorRecord>,
}

/// A discovery error rendered to an owned, cloneable record (the error's
/// io::Error source is not Clone, so scan failures are flattened to text).
#[derive(Debug, Clone)]
pub struct DiscoveryErrorRecord {
    pub message: String,
}

impl From<&DiscoveryError> for DiscoveryErrorRecord {
    fn from(err: &DiscoveryError) -> Self {
        Self { message: err.to_string() }
    }
}

fn immediate_subdirs(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let read_dir = fs::read_dir(root).map_err(|source| DiscoveryError::ReadDir {
        root: root.to_path_buf(),
        source,
    })?;
    let mut dirs = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| DiscoveryError::ReadDir {
            root: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            if let Ok(utf8) = Utf8PathBuf::from_path_buf(path) {
                dirs.push(utf8);
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

struct ScanOutcome<D> {
    entries: Vec<(Identity, CatalogEntry<D>)>,
    errors: Vec<DiscoveryError>,
}

fn scan_entity<D, F, E>(
    root: &Utf8Path,
    manifest_file_name: &str,
    parse: F,
    identity_of: E,
) -> Result<ScanOutcome<D>, DiscoveryError>
where
    F: Fn(&str) -> Result<D, ManifestError>,
    E: Fn(&D) -> Result<Identity, ManifestError>,
{
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for folder in immediate_subdirs(root)? {
        let manifest_path = folder.join(manifest_file_name);
        if !manifest_path.is_file() {
            continue;
        }
        let content = match fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(source) => {
                errors.push(DiscoveryError::ReadManifest { path: manifest_path.clone(), source });
                continue;
            }
        };
        match parse(&content).and_then(|descriptor| {
            let identity = identity_of(&descriptor)?;
            Ok((identity, descriptor))
        }) {
            Ok((identity, descriptor)) => {
                entries.push((
                    identity,
                    CatalogEntry { descriptor, manifest_path, folder_path: folder },
                ));
            }
            Err(source) => errors.push(DiscoveryError::Parse { path: manifest_path, source }),
        }
    }
    Ok(ScanOutcome { entries, errors })
}

fn build_map<D>(
    entity_type: EntityType,
    entries: Vec<(Identity, CatalogEntry<D>)>,
    errors: &mut Vec<DiscoveryError>,
) -> BTreeMap<Identity, CatalogEntry<D>> {
    let mut grouped: BTreeMap<Identity, Vec<CatalogEntry<D>>> = BTreeMap::new();
    for (identity, entry) in entries {
        grouped.entry(identity).or_default().push(entry);
    }
    let mut map = BTreeMap::new();
    for (identity, mut group) in grouped {
        if group.len() > 1 {
            let paths = group.iter().map(|e| e.folder_path.clone()).collect();
            errors.push(DiscoveryError::DuplicateIdentity {
                entity_type,
                id: identity.id().to_string(),
                version: identity.version().to_string(),
                paths,
            });
            continue;
        }
        map.insert(identity, group.pop().expect("group has exactly one entry"));
    }
    map
}

/// Scan the three asset roots and build an immutable [`Catalog`].
///
/// Errors during parsing or duplicate-identity conflicts are collected in
/// the returned report rather than aborting the scan; a descriptor with a
/// parse error is simply omitted from the catalog.
pub fn discover(
    cases_root: &Utf8Path,
    suites_root: &Utf8Path,
    plans_root: &Utf8Path,
) -> Result<DiscoveryReport, DiscoveryError> {
    let mut errors = Vec::new();

    let case_scan = scan_entity(
        cases_root,
        CASE_MANIFEST_FILE,
        |s| TestCaseDescriptor::parse(s),
        |d| d.identity(),
    )?;
    errors.extend(case_scan.errors);
    let cases = build_map(EntityType::TestCase, case_scan.entries, &mut errors);

    let suite_scan = scan_entity(
        suites_root,
        SUITE_MANIFEST_FILE,
        |s| SuiteDescriptor::parse(s),
        |d| d.identity(),
    )?;
    errors.extend(suite_scan.errors);
    let suites = build_map(EntityType::Suite, suite_scan.entries, &mut errors);

    let plan_scan = scan_entity(
        plans_root,
        PLAN_MANIFEST_FILE,
        |s| PlanDescriptor::parse(s),
        |d| d.identity(),
    )?;
    errors.extend(plan_scan.errors);
    let plans = build_map(EntityType::Plan, plan_scan.entries, &mut errors);

    let catalog = Catalog {
        cases,
        suites,
        plans,
        cases_root: cases_root.to_path_buf(),
        suites_root: suites_root.to_path_buf(),
        plans_root: plans_root.to_path_buf(),
    };

    Ok(DiscoveryReport {
        catalog,
        errors: errors.iter().map(DiscoveryErrorRecord::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn write_case(root: &Utf8Path, folder: &str, id: &str, version: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"schemaVersion":"1","id":"{id}","version":"{version}","name":"n","category":"c"}}"#
        );
        fs::write(dir.join(CASE_MANIFEST_FILE), json).unwrap();
    }

    #[test]
    fn discovers_cases_and_skips_folders_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        write_case(&cases_root, "CpuStress", "CpuStress", "1.0.0");
        fs::create_dir_all(cases_root.join("empty-folder")).unwrap();

        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        assert_eq!(report.catalog.cases.len(), 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn duplicate_identity_is_reported_and_excluded() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        write_case(&cases_root, "one", "Dup", "1.0.0");
        write_case(&cases_root, "two", "Dup", "1.0.0");

        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        assert!(report.catalog.cases.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("duplicate"));
    }

    #[test]
    fn parse_error_is_collected_and_descriptor_omitted() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        let dir = cases_root.join("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CASE_MANIFEST_FILE), "{ not json").unwrap();

        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        assert!(report.catalog.cases.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn missing_root_yields_empty_catalog_not_error() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let report =
            discover(&root.join("nope"), &root.join("also-nope"), &root.join("still-nope"))
                .unwrap();
        assert!(report.catalog.cases.is_empty());
        assert!(report.errors.is_empty());
    }
}
