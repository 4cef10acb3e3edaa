//! Secret redaction (SPEC_FULL.md §4.12).
//!
//! Unlike a signature-based secret scanner, this redactor only ever knows
//! about secret values that the engine itself produced by resolving a
//! `secret: true` env-reference during the current run. That is a closed,
//! exact set — so redaction is exact-value substring scrubbing, not pattern
//! matching.

use std::collections::HashSet;

/// Literal string the engine persists in place of any secret value.
pub const REDACTED_PLACEHOLDER: &str = "***";

/// Tracks secret literal values observed during a single run and scrubs them
/// out of anything about to be persisted or logged.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    secrets: HashSet<String>,
}

impl SecretRedactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value as secret. Empty strings are never tracked: they
    /// would match every string during scrubbing.
    pub fn track(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.insert(value);
        }
    }

    #[must_use]
    pub fn is_tracking_any(&self) -> bool {
        !self.secrets.is_empty()
    }

    /// Replace a value known to be secret-tagged wholesale with the redacted
    /// placeholder, regardless of its content. Used for building the redacted
    /// mirror of an effective-inputs / effective-environment map.
    #[must_use]
    pub fn redact_value(&self, _value: &serde_json::Value) -> serde_json::Value {
        serde_json::Value::String(REDACTED_PLACEHOLDER.to_string())
    }

    /// Scrub any tracked secret literal out of free text (error messages,
    /// receipts, log lines) by exact substring replacement.
    #[must_use]
    pub fn redact_string(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED_PLACEHOLDER);
            }
        }
        out
    }

    /// True if `text` still contains any tracked secret literal. Used as a
    /// defensive check immediately before a write to a run-folder artifact.
    #[must_use]
    pub fn contains_secret(&self, text: &str) -> bool {
        self.secrets.iter().any(|s| text.contains(s.as_str()))
    }
}
