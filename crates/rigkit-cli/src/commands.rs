//! Translates parsed CLI arguments into the typed values `rigkit_engine`
//! expects: `Identity`, `RawInput` overrides, and environment overrides.

use std::collections::BTreeMap;

use rigkit_manifest::{Identity, IdentityError, RawInput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliArgError {
    #[error("invalid identity '{0}': {1}")]
    Identity(String, IdentityError),

    #[error("'{0}' is not in KEY=VALUE form")]
    MissingEquals(String),

    #[error("'{0}' is not in NODE.KEY=VALUE form")]
    MissingNodeKey(String),
}

pub fn parse_identity(raw: &str) -> Result<Identity, CliArgError> {
    raw.parse().map_err(|e| CliArgError::Identity(raw.to_string(), e))
}

/// Parse a `key=jsonValue` pair into a `RawInput::Literal`. A value that
/// doesn't parse as JSON is taken as a bare string, so `--input host=db1`
/// works without quoting.
fn parse_literal_pair(raw: &str) -> Result<(String, RawInput), CliArgError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| CliArgError::MissingEquals(raw.to_string()))?;
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), RawInput::Literal(parsed)))
}

/// Parse repeated `--input key=jsonValue` flags into the map `RunRequest::for_case` expects.
pub fn parse_case_inputs(raw: &[String]) -> Result<Option<BTreeMap<String, RawInput>>, CliArgError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut map = BTreeMap::new();
    for entry in raw {
        let (key, value) = parse_literal_pair(entry)?;
        map.insert(key, value);
    }
    Ok(Some(map))
}

/// Parse repeated `--node-input nodeId.key=jsonValue` flags into the
/// node-keyed map `RunRequest::for_suite` expects.
pub fn parse_node_inputs(
    raw: &[String],
) -> Result<Option<BTreeMap<String, BTreeMap<String, RawInput>>>, CliArgError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut nodes: BTreeMap<String, BTreeMap<String, RawInput>> = BTreeMap::new();
    for entry in raw {
        let (node_and_key, value_raw) = entry.split_once('=').ok_or_else(|| CliArgError::MissingEquals(entry.clone()))?;
        let (node_id, key) =
            node_and_key.split_once('.').ok_or_else(|| CliArgError::MissingNodeKey(entry.clone()))?;
        let parsed = serde_json::from_str(value_raw)
            .unwrap_or_else(|_| serde_json::Value::String(value_raw.to_string()));
        nodes.entry(node_id.to_string()).or_default().insert(key.to_string(), RawInput::Literal(parsed));
    }
    Ok(Some(nodes))
}

/// Parse repeated `--env NAME=value` flags into the environment override map
/// every `RunRequest` constructor accepts.
pub fn parse_env_overrides(raw: &[String]) -> Result<Option<BTreeMap<String, String>>, CliArgError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut map = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| CliArgError::MissingEquals(entry.clone()))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(Some(map))
}
