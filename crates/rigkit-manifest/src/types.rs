//! Descriptor models for test cases, suites, and plans (SPEC_FULL.md §4.1).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::identity::Identity;

/// Schema versions this parser understands. Only the major component is
/// checked (spec.md §4.1: "unknown top-level fields are rejected (strict)").
pub const SUPPORTED_SCHEMA_MAJOR: &str = "1";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest schemaVersion '{0}' is not supported (supported major: {SUPPORTED_SCHEMA_MAJOR})")]
    UnsupportedSchemaVersion(String),

    #[error("manifest has unknown top-level field '{0}' (extension fields must be prefixed 'x-')")]
    UnknownField(String),

    #[error("failed to parse manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid identity in manifest: {0}")]
    Identity(#[from] crate::identity::IdentityError),
}

/// Any top-level key outside this convention is rejected by
/// [`validate_extensions`]; keys matching it are preserved verbatim as a
/// forward-compatibility escape hatch, never interpreted by the engine.
fn validate_extensions(extra: &Map<String, Value>) -> Result<(), ManifestError> {
    for key in extra.keys() {
        if !key.starts_with("x-") {
            return Err(ManifestError::UnknownField(key.clone()));
        }
    }
    Ok(())
}

fn check_schema_version(schema_version: &str) -> Result<(), ManifestError> {
    let major = schema_version.split('.').next().unwrap_or(schema_version);
    if major != SUPPORTED_SCHEMA_MAJOR {
        return Err(ManifestError::UnsupportedSchemaVersion(schema_version.to_string()));
    }
    Ok(())
}

/// Privilege level a test case script requires (spec.md §3, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Privilege {
    User,
    AdminPreferred,
    AdminRequired,
}

impl Default for Privilege {
    fn default() -> Self {
        Self::User
    }
}

/// Declared parameter type, closed set (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Double,
    String,
    Boolean,
    Path,
    File,
    Folder,
    Enum,
    Json,
}

/// A literal JSON default or an indirection through the effective
/// environment (spec.md §9 design note: binary variant, discriminated by the
/// presence of `$env`, never a subclass hierarchy).
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Literal(Value),
    EnvRef(EnvReference),
}

impl Serialize for RawInput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Literal(v) => v.serialize(serializer),
            Self::EnvRef(r) => {
                let mut wrapper = Map::new();
                wrapper.insert("$env".to_string(), serde_json::to_value(r).map_err(serde::ser::Error::custom)?);
                Value::Object(wrapper).serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for RawInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if let Value::Object(ref obj) = value {
            if let Some(env) = obj.get("$env") {
                let env_ref: EnvReference = serde_json::from_value(env.clone()).map_err(serde::de::Error::custom)?;
                return Ok(Self::EnvRef(env_ref));
            }
        }
        Ok(Self::Literal(value))
    }
}

/// An indirection through the effective environment (spec.md §3 "Env-reference").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvReference {
    pub var: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub secret: bool,
}

/// Parameter definition (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<RawInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, rename = "enumValues", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, rename = "uiHint", skip_serializing_if = "Option::is_none")]
    pub ui_hint: Option<String>,
}

/// Test case descriptor, paired with a script file in the same folder
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseDescriptor {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub id: String,
    pub version: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege: Option<Privilege>,
    #[serde(default, rename = "timeoutSec", skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestCaseDescriptor {
    pub fn identity(&self) -> Result<Identity, ManifestError> {
        Ok(Identity::new(&self.id, &self.version)?)
    }

    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let descriptor: Self = serde_json::from_str(json)?;
        check_schema_version(&descriptor.schema_version)?;
        validate_extensions(&descriptor.extra)?;
        if let Some(timeout) = descriptor.timeout_sec {
            if timeout == 0 {
                return Err(ManifestError::UnknownField(
                    "timeoutSec must be a positive number of seconds".to_string(),
                ));
            }
        }
        Ok(descriptor)
    }
}

/// One element of a suite's ordered test-case list (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseNode {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "ref")]
    pub case_ref: String,
    #[serde(default, rename = "inputs")]
    pub inputs: BTreeMap<String, RawInput>,
}

/// Per-case controls set at the suite level, applied to every node unless
/// overridden per-node in a future schema version (spec.md §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteControls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
    #[serde(default, rename = "maxParallel", skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<u32>,
    #[serde(default, rename = "continueOnFailure", skip_serializing_if = "Option::is_none")]
    pub continue_on_failure: Option<bool>,
    #[serde(default, rename = "retryOnError", skip_serializing_if = "Option::is_none")]
    pub retry_on_error: Option<u32>,
    #[serde(default, rename = "timeoutPolicy", skip_serializing_if = "Option::is_none")]
    pub timeout_policy: Option<TimeoutPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeoutPolicy {
    AbortSuite,
    ContinueSuite,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::AbortSuite
    }
}

/// Suite descriptor (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteDescriptor {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub controls: SuiteControls,
    #[serde(default, rename = "environment")]
    pub environment: BTreeMap<String, String>,
    #[serde(rename = "cases")]
    pub nodes: Vec<TestCaseNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SuiteDescriptor {
    pub fn identity(&self) -> Result<Identity, ManifestError> {
        Ok(Identity::new(&self.id, &self.version)?)
    }

    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let descriptor: Self = serde_json::from_str(json)?;
        check_schema_version(&descriptor.schema_version)?;
        validate_extensions(&descriptor.extra)?;
        Ok(descriptor)
    }
}

/// One element of a plan's ordered suite list (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteNode {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "ref")]
    pub suite_ref: String,
}

/// Plan descriptor (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDescriptor {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub id: String,
    pub version: String,
    #[serde(default, rename = "environment")]
    pub environment: BTreeMap<String, String>,
    #[serde(rename = "suites")]
    pub nodes: Vec<SuiteNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanDescriptor {
    pub fn identity(&self) -> Result<Identity, ManifestError> {
        Ok(Identity::new(&self.id, &self.version)?)
    }

    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let descriptor: Self = serde_json::from_str(json)?;
        check_schema_version(&descriptor.schema_version)?;
        validate_extensions(&descriptor.extra)?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case_json() -> &'static str {
        r#"{
            "schemaVersion": "1",
            "id": "CpuStress",
            "version": "1.0.0",
            "name": "CPU Stress Test",
            "category": "stress",
            "timeoutSec": 60,
            "tags": ["cpu"],
            "parameters": [
                {"name": "durationSec", "type": "int", "required": true, "min": 1.0, "max": 3600.0},
                {"name": "token", "type": "string", "required": false,
                 "default": {"$env": {"var": "API_TOKEN", "required": true, "secret": true}}}
            ]
        }"#
    }

    #[test]
    fn parses_test_case_descriptor() {
        let descriptor = TestCaseDescriptor::parse(sample_case_json()).unwrap();
        assert_eq!(descriptor.id, "CpuStress");
        assert_eq!(descriptor.parameters.len(), 2);
        assert!(matches!(descriptor.parameters[0].param_type, ParamType::Int));
        match &descriptor.parameters[1].default {
            Some(RawInput::EnvRef(env_ref)) => {
                assert_eq!(env_ref.var, "API_TOKEN");
                assert!(env_ref.secret);
            }
            other => panic!("expected env-ref default, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let json = r#"{
            "schemaVersion": "1", "id": "A", "version": "1", "name": "n", "category": "c",
            "bogusField": true
        }"#;
        let err = TestCaseDescriptor::parse(json).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownField(f) if f == "bogusField"));
    }

    #[test]
    fn allows_x_prefixed_extension_field() {
        let json = r#"{
            "schemaVersion": "1", "id": "A", "version": "1", "name": "n", "category": "c",
            "x-vendor-note": "future use"
        }"#;
        let descriptor = TestCaseDescriptor::parse(json).unwrap();
        assert_eq!(descriptor.extra.get("x-vendor-note").unwrap(), "future use");
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let json = r#"{
            "schemaVersion": "2", "id": "A", "version": "1", "name": "n", "category": "c"
        }"#;
        assert!(matches!(
            TestCaseDescriptor::parse(json).unwrap_err(),
            ManifestError::UnsupportedSchemaVersion(v) if v == "2"
        ));
    }

    #[test]
    fn parses_suite_descriptor_with_nodes() {
        let json = r#"{
            "schemaVersion": "1", "id": "SmokeSuite", "version": "1",
            "cases": [
                {"nodeId": "n1", "ref": "CpuStress@1.0.0", "inputs": {"durationSec": 10}}
            ]
        }"#;
        let descriptor = SuiteDescriptor::parse(json).unwrap();
        assert_eq!(descriptor.nodes.len(), 1);
        assert_eq!(descriptor.nodes[0].node_id, "n1");
    }

    #[test]
    fn raw_input_round_trips_literal_and_envref() {
        let literal = RawInput::Literal(serde_json::json!(42));
        let json = serde_json::to_string(&literal).unwrap();
        assert_eq!(json, "42");

        let env_ref = RawInput::EnvRef(EnvReference {
            var: "X".to_string(),
            default: None,
            required: true,
            secret: false,
        });
        let json = serde_json::to_string(&env_ref).unwrap();
        let back: RawInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env_ref);
    }
}
