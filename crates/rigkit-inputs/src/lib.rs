//! Layers a case's declared parameters against a suite node's `inputs` and
//! any run-request overrides, substitutes env-references, validates, and
//! produces a redacted mirror for artifact persistence (SPEC_FULL.md §4.6).

use std::collections::{BTreeMap, HashSet};

use rigkit_manifest::{ParamType, ParameterDef, RawInput};
use rigkit_values::{Value, ValueError};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Inputs.Unknown: '{0}' is not a declared parameter")]
    Unknown(String),

    #[error("Inputs.MissingRequired: required parameter '{0}' has no value")]
    MissingRequired(String),

    #[error("Inputs.TypeInvalid: parameter '{parameter}': {source}")]
    TypeInvalid { parameter: String, source: ValueError },

    #[error("Inputs.EnumInvalid: parameter '{parameter}': {source}")]
    EnumInvalid { parameter: String, source: ValueError },

    #[error("EnvRef.ResolveFailed: parameter='{parameter}', nodeId='{node_id}', reason='{reason}'")]
    EnvRefResolveFailed { parameter: String, node_id: String, reason: String },
}

/// The fully resolved, validated inputs for one case invocation.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    pub values: BTreeMap<String, Value>,
    secret_params: HashSet<String>,
}

impl ResolvedInputs {
    #[must_use]
    pub fn is_secret(&self, parameter: &str) -> bool {
        self.secret_params.contains(parameter)
    }

    /// Redacted mirror: every secret-tagged value is replaced with `***`.
    /// This is the JSON document persisted as `params.json`.
    #[must_use]
    pub fn to_redacted_json(&self) -> BTreeMap<String, Json> {
        self.values
            .iter()
            .map(|(name, value)| {
                let rendered = if self.secret_params.contains(name) {
                    Json::String("***".to_string())
                } else {
                    value.to_json()
                };
                (name.clone(), rendered)
            })
            .collect()
    }

    /// Unredacted mirror, used only for passing to the runner process.
    #[must_use]
    pub fn to_json(&self) -> BTreeMap<String, Json> {
        self.values.iter().map(|(name, value)| (name.clone(), value.to_json())).collect()
    }
}

/// Read access to the effective environment, decoupled from
/// `rigkit_env::EffectiveEnv` so this crate doesn't need a hard dependency
/// on its concrete storage.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<&str>;
}

impl EnvLookup for rigkit_env::EffectiveEnv {
    fn get(&self, key: &str) -> Option<&str> {
        rigkit_env::EffectiveEnv::get(self, key)
    }
}

fn resolve_one(
    param: &ParameterDef,
    raw: &RawInput,
    node_id: &str,
    env: &dyn EnvLookup,
) -> Result<Option<(Value, bool)>, InputError> {
    match raw {
        RawInput::Literal(json) => {
            let value = parse_value(param, json)?;
            Ok(Some((value, false)))
        }
        RawInput::EnvRef(env_ref) => {
            let looked_up = env.get(&env_ref.var).filter(|v| !v.is_empty()).map(str::to_string);
            match looked_up {
                Some(text) => {
                    let value = rigkit_values::from_str_surface(
                        param.param_type,
                        param.enum_values.as_deref(),
                        &text,
                    )
                    .map_err(|source| classify_value_error(param.name.clone(), source))?;
                    Ok(Some((value, env_ref.secret)))
                }
                None => {
                    if let Some(default) = &env_ref.default {
                        let value = parse_value(param, default)?;
                        Ok(Some((value, env_ref.secret)))
                    } else if env_ref.required {
                        Err(InputError::EnvRefResolveFailed {
                            parameter: param.name.clone(),
                            node_id: node_id.to_string(),
                            reason: format!("environment variable '{}' is unset", env_ref.var),
                        })
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}

fn parse_value(param: &ParameterDef, json: &Json) -> Result<Value, InputError> {
    rigkit_values::from_json(param.param_type, param.enum_values.as_deref(), json)
        .map_err(|source| classify_value_error(param.name.clone(), source))
}

fn classify_value_error(parameter: String, source: ValueError) -> InputError {
    match &source {
        ValueError::EnumInvalid(_) | ValueError::MissingEnumValues => {
            InputError::EnumInvalid { parameter, source }
        }
        _ => InputError::TypeInvalid { parameter, source },
    }
}

/// Resolve the effective inputs for one case invocation.
///
/// Layering order (later overrides earlier, whole-value replacement, no
/// field-level merge): parameter defaults, suite-node `inputs`, run-request
/// per-node overrides. `node_id` is used only to annotate
/// [`InputError::EnvRefResolveFailed`].
pub fn resolve_inputs(
    parameters: &[ParameterDef],
    node_id: &str,
    suite_node_inputs: Option<&BTreeMap<String, RawInput>>,
    request_overrides: Option<&BTreeMap<String, RawInput>>,
    env: &dyn EnvLookup,
) -> Result<ResolvedInputs, InputError> {
    let declared: BTreeMap<&str, &ParameterDef> =
        parameters.iter().map(|p| (p.name.as_str(), p)).collect();

    for key in suite_node_inputs.into_iter().flatten().map(|(k, _)| k) {
        if !declared.contains_key(key.as_str()) {
            return Err(InputError::Unknown(key.clone()));
        }
    }
    for key in request_overrides.into_iter().flatten().map(|(k, _)| k) {
        if !declared.contains_key(key.as_str()) {
            return Err(InputError::Unknown(key.clone()));
        }
    }

    let mut layered: BTreeMap<String, RawInput> = BTreeMap::new();
    for param in parameters {
        if let Some(default) = &param.default {
            layered.insert(param.name.clone(), default.clone());
        }
    }
    if let Some(inputs) = suite_node_inputs {
        for (key, value) in inputs {
            layered.insert(key.clone(), value.clone());
        }
    }
    if let Some(overrides) = request_overrides {
        for (key, value) in overrides {
            layered.insert(key.clone(), value.clone());
        }
    }

    let mut resolved = ResolvedInputs::default();
    for param in parameters {
        let Some(raw) = layered.get(&param.name) else {
            if param.required {
                return Err(InputError::MissingRequired(param.name.clone()));
            }
            continue;
        };
        match resolve_one(param, raw, node_id, env)? {
            Some((value, secret)) => {
                rigkit_values::validate_bounds(&value, param.min, param.max)
                    .map_err(|source| classify_value_error(param.name.clone(), source))?;
                rigkit_values::validate_pattern(&value, param.pattern.as_deref())
                    .map_err(|source| classify_value_error(param.name.clone(), source))?;
                if secret {
                    resolved.secret_params.insert(param.name.clone());
                }
                resolved.values.insert(param.name.clone(), value);
            }
            None => {
                if param.required {
                    return Err(InputError::MissingRequired(param.name.clone()));
                }
            }
        }
    }

    Ok(resolved)
}
