//! Four-layer effective-environment composition (SPEC_FULL.md §4.5).
//!
//! Layers, later overriding earlier: process OS snapshot, plan environment
//! block, suite environment block, per-run overrides. Keys are compared
//! case-insensitively but the original casing of the last layer to set a
//! key is what gets exposed to the runner.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvLayer {
    Os,
    Plan,
    Suite,
    Override,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("environment variable name must not be empty")]
    EmptyKey,
}

fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// A case-insensitive-keyed string map built by layering, plus an
/// out-of-band set of keys known to carry secret-derived values.
#[derive(Debug, Clone, Default)]
pub struct EffectiveEnv {
    entries: BTreeMap<String, (String, String)>,
    secret_keys: HashSet<String>,
}

impl EffectiveEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one layer's key/value pairs, later calls overriding earlier
    /// ones for the same (case-insensitive) key. Empty keys are rejected.
    pub fn apply_layer<I, K, V>(&mut self, _layer: EnvLayer, pairs: I) -> Result<(), EnvError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            let key = key.into();
            if key.is_empty() {
                return Err(EnvError::EmptyKey);
            }
            let normalized = normalize_key(&key);
            self.entries.insert(normalized, (key, value.into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(|(_, v)| v.as_str())
    }

    pub fn mark_secret(&mut self, key: &str) {
        self.secret_keys.insert(normalize_key(key));
    }

    #[must_use]
    pub fn is_secret(&self, key: &str) -> bool {
        self.secret_keys.contains(&normalize_key(key))
    }

    /// Iterate `(original-case key, value)` pairs in key order, for passing
    /// to a spawned process.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A redacted mirror suitable for `env.json`: secret-marked values
    /// become the literal `***`.
    #[must_use]
    pub fn to_redacted_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(normalized, (original_key, value))| {
                let rendered = if self.secret_keys.contains(normalized) {
                    "***".to_string()
                } else {
                    value.clone()
                };
                (original_key.clone(), rendered)
            })
            .collect()
    }
}

/// Build the base layer from the current process's OS environment snapshot.
#[must_use]
pub fn os_snapshot() -> Vec<(String, String)> {
    std::env::vars().collect()
}
