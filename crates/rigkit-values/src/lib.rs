//! Typed parameter value normalization: the JSON surface and the raw-string
//! surface (environment/command-line values) must agree on a closed set of
//! declared types (SPEC_FULL.md §4.4).

use regex::Regex;
use rigkit_manifest::ParamType;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("value is not valid for declared type {param_type:?}: {detail}")]
    TypeInvalid { param_type: ParamType, detail: String },

    #[error("value '{0}' does not match any declared enumValues member")]
    EnumInvalid(String),

    #[error("enum type requires a non-empty enumValues list")]
    MissingEnumValues,

    #[error("value {value} is out of bounds [{min:?}, {max:?}]")]
    OutOfBounds { value: f64, min: Option<f64>, max: Option<f64> },

    #[error("value '{value}' does not match pattern '{pattern}'")]
    PatternMismatch { value: String, pattern: String },

    #[error("invalid regex pattern '{0}': {1}")]
    InvalidPattern(String, String),
}

/// A normalized parameter value. One variant per declared [`ParamType`];
/// `path`/`file`/`folder` carry a plain string, unchecked by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Double(f64),
    String(String),
    Boolean(bool),
    Path(String),
    File(String),
    Folder(String),
    Enum(String),
    Json(Json),
}

impl Value {
    #[must_use]
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_enum_str(&self) -> Option<&str> {
        match self {
            Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Render back to a JSON fragment, the canonical form persisted in
    /// artifacts (`params.json`).
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Int(i) => Json::from(*i),
            Self::Double(d) => Json::from(*d),
            Self::String(s) | Self::Path(s) | Self::File(s) | Self::Folder(s) | Self::Enum(s) => {
                Json::from(s.clone())
            }
            Self::Boolean(b) => Json::from(*b),
            Self::Json(j) => j.clone(),
        }
    }
}

fn parse_bool_string(s: &str) -> Option<bool> {
    match s {
        "1" => Some(true),
        "0" => Some(false),
        _ if s.eq_ignore_ascii_case("true") => Some(true),
        _ if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn json_number_to_i32(n: &serde_json::Number) -> Option<i32> {
    n.as_i64().and_then(|v| i32::try_from(v).ok())
}

/// Parse a JSON document element as the declared type (the preferred
/// surface: manifest defaults, suite-node `inputs`, run-request overrides).
pub fn from_json(param_type: ParamType, enum_values: Option<&[String]>, json: &Json) -> Result<Value, ValueError> {
    match param_type {
        ParamType::Int => match json.as_number().and_then(json_number_to_i32) {
            Some(i) => Ok(Value::Int(i)),
            None => Err(ValueError::TypeInvalid {
                param_type,
                detail: format!("'{json}' is not a 32-bit integer"),
            }),
        },
        ParamType::Double => json.as_f64().map(Value::Double).ok_or_else(|| ValueError::TypeInvalid {
            param_type,
            detail: format!("'{json}' is not a number"),
        }),
        ParamType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(|| ValueError::TypeInvalid {
            param_type,
            detail: format!("'{json}' is not a boolean literal"),
        }),
        ParamType::String => json.as_str().map(|s| Value::String(s.to_string())).ok_or_else(|| {
            ValueError::TypeInvalid { param_type, detail: format!("'{json}' is not a string") }
        }),
        ParamType::Path => json.as_str().map(|s| Value::Path(s.to_string())).ok_or_else(|| {
            ValueError::TypeInvalid { param_type, detail: format!("'{json}' is not a string") }
        }),
        ParamType::File => json.as_str().map(|s| Value::File(s.to_string())).ok_or_else(|| {
            ValueError::TypeInvalid { param_type, detail: format!("'{json}' is not a string") }
        }),
        ParamType::Folder => json.as_str().map(|s| Value::Folder(s.to_string())).ok_or_else(|| {
            ValueError::TypeInvalid { param_type, detail: format!("'{json}' is not a string") }
        }),
        ParamType::Enum => {
            let s = json.as_str().ok_or_else(|| ValueError::TypeInvalid {
                param_type,
                detail: format!("'{json}' is not a string"),
            })?;
            validate_enum_membership(s, enum_values)?;
            Ok(Value::Enum(s.to_string()))
        }
        ParamType::Json => Ok(Value::Json(json.clone())),
    }
}

/// Parse a raw string (environment variable or command-line surface) as the
/// declared type. Must agree with [`from_json`] for identical logical
/// inputs.
pub fn from_str_surface(param_type: ParamType, enum_values: Option<&[String]>, raw: &str) -> Result<Value, ValueError> {
    match param_type {
        ParamType::Int => {
            let trimmed = raw.trim();
            if trimmed.starts_with('+') {
                return Err(ValueError::TypeInvalid {
                    param_type,
                    detail: format!("'{raw}' is not a 32-bit decimal integer"),
                });
            }
            trimmed.parse::<i32>().map(Value::Int).map_err(|_| ValueError::TypeInvalid {
                param_type,
                detail: format!("'{raw}' is not a 32-bit decimal integer"),
            })
        }
        ParamType::Double => raw.trim().parse::<f64>().map(Value::Double).map_err(|_| ValueError::TypeInvalid {
            param_type,
            detail: format!("'{raw}' is not a double"),
        }),
        ParamType::Boolean => parse_bool_string(raw.trim()).map(Value::Boolean).ok_or_else(|| {
            ValueError::TypeInvalid { param_type, detail: format!("'{raw}' is not a boolean") }
        }),
        ParamType::String => Ok(Value::String(raw.to_string())),
        ParamType::Path => Ok(Value::Path(raw.to_string())),
        ParamType::File => Ok(Value::File(raw.to_string())),
        ParamType::Folder => Ok(Value::Folder(raw.to_string())),
        ParamType::Enum => {
            validate_enum_membership(raw, enum_values)?;
            Ok(Value::Enum(raw.to_string()))
        }
        ParamType::Json => serde_json::from_str(raw).map(Value::Json).map_err(|e| ValueError::TypeInvalid {
            param_type,
            detail: e.to_string(),
        }),
    }
}

fn validate_enum_membership(candidate: &str, enum_values: Option<&[String]>) -> Result<(), ValueError> {
    let values = enum_values.ok_or(ValueError::MissingEnumValues)?;
    if values.is_empty() {
        return Err(ValueError::MissingEnumValues);
    }
    if values.iter().any(|v| v == candidate) {
        Ok(())
    } else {
        Err(ValueError::EnumInvalid(candidate.to_string()))
    }
}

/// Check declared inclusive `min`/`max` bounds against a numeric value.
/// A no-op for non-numeric values.
pub fn validate_bounds(value: &Value, min: Option<f64>, max: Option<f64>) -> Result<(), ValueError> {
    let Some(n) = value.as_numeric() else { return Ok(()) };
    let below = min.is_some_and(|m| n < m);
    let above = max.is_some_and(|m| n > m);
    if below || above {
        return Err(ValueError::OutOfBounds { value: n, min, max });
    }
    Ok(())
}

/// Check a declared regex `pattern` against a string-typed value. A no-op
/// for non-string values (enum membership is checked separately).
pub fn validate_pattern(value: &Value, pattern: Option<&str>) -> Result<(), ValueError> {
    let Some(pattern) = pattern else { return Ok(()) };
    let Value::String(s) = value else { return Ok(()) };
    let regex = Regex::new(pattern).map_err(|e| ValueError::InvalidPattern(pattern.to_string(), e.to_string()))?;
    if regex.is_match(s) {
        Ok(())
    } else {
        Err(ValueError::PatternMismatch { value: s.clone(), pattern: pattern.to_string() })
    }
}
