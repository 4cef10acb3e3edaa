//! Versioned entity identity (SPEC_FULL.md §4.1 / spec.md §3).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Kind of catalog entity an [`Identity`] refers to. Not part of the
/// identity's equality/ordering — the same `(id, version)` pair is only
/// required to be unique *within* one entity type (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    TestCase,
    Suite,
    Plan,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TestCase => "testCase",
            Self::Suite => "suite",
            Self::Plan => "plan",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity string is empty")]
    Empty,
    #[error("identity '{0}' is missing an '@version' suffix")]
    MissingVersion(String),
    #[error("identity '{0}' has more than one '@'")]
    MultipleAt(String),
    #[error("identity component '{0}' is empty")]
    EmptyComponent(String),
    #[error("identity component '{component}' contains a character outside [A-Za-z0-9._-]")]
    InvalidCharacter { component: String },
    #[error("identity component '{component}' contains whitespace")]
    Whitespace { component: String },
}

/// A versioned entity identity: `(id, version)`, stringified as `id@version`.
///
/// Both fields must match `[A-Za-z0-9._-]+` and contain no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    id: String,
    version: String,
}

fn validate_component(component: &str) -> Result<(), IdentityError> {
    if component.is_empty() {
        return Err(IdentityError::EmptyComponent(component.to_string()));
    }
    if component.chars().any(char::is_whitespace) {
        return Err(IdentityError::Whitespace {
            component: component.to_string(),
        });
    }
    if !component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(IdentityError::InvalidCharacter {
            component: component.to_string(),
        });
    }
    Ok(())
}

impl Identity {
    /// Construct an identity from already-validated components.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        let version = version.into();
        validate_component(&id)?;
        validate_component(&version)?;
        Ok(Self { id, version })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        let mut parts = s.splitn(3, '@');
        let id = parts.next().ok_or(IdentityError::Empty)?;
        let version = parts
            .next()
            .ok_or_else(|| IdentityError::MissingVersion(s.to_string()))?;
        if parts.next().is_some() {
            return Err(IdentityError::MultipleAt(s.to_string()));
        }
        Identity::new(id, version)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

impl serde::Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identity::from_str(&s).map_err(serde::de::Error::custom)
    }
}
