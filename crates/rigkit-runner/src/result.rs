//! The runner's structured result (SPEC_FULL.md §6.2) and the closed
//! status variant shared across the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Final status of one run. A closed tagged union, never a stringly-typed
/// code (spec.md §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Error,
    Timeout,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// `{type, source, message, stack}` error detail attached to a non-passed
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), source: None, message: message.into(), stack: None }
    }
}

/// The `result.json` document a runner produces, or the engine synthesizes
/// when a runner fails to produce one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "runType")]
    pub run_type: String,
    #[serde(rename = "testId")]
    pub test_id: String,
    #[serde(rename = "testVersion")]
    pub test_version: String,
    pub status: RunStatus,
    #[serde(rename = "startTime")]
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "endTime")]
    pub end_time: chrono::DateTime<chrono::Utc>,
    #[serde(default, rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Json>,
    #[serde(rename = "effectiveInputs")]
    pub effective_inputs: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, rename = "runner", skip_serializing_if = "Option::is_none")]
    pub runner_info: Option<Json>,
}

impl RunnerResult {
    #[must_use]
    pub fn synthesize_error(
        test_id: &str,
        test_version: &str,
        start_time: chrono::DateTime<chrono::Utc>,
        end_time: chrono::DateTime<chrono::Utc>,
        effective_inputs: Json,
        detail: ErrorDetail,
    ) -> Self {
        Self {
            schema_version: "1".to_string(),
            run_type: "testCase".to_string(),
            test_id: test_id.to_string(),
            test_version: test_version.to_string(),
            status: RunStatus::Error,
            start_time,
            end_time,
            exit_code: None,
            metrics: None,
            effective_inputs,
            error: Some(detail),
            runner_info: None,
        }
    }

    #[must_use]
    pub fn synthesize_timeout(
        test_id: &str,
        test_version: &str,
        start_time: chrono::DateTime<chrono::Utc>,
        end_time: chrono::DateTime<chrono::Utc>,
        effective_inputs: Json,
        timeout_sec: u64,
    ) -> Self {
        Self {
            schema_version: "1".to_string(),
            run_type: "testCase".to_string(),
            test_id: test_id.to_string(),
            test_version: test_version.to_string(),
            status: RunStatus::Timeout,
            start_time,
            end_time,
            exit_code: None,
            metrics: None,
            effective_inputs,
            error: Some(ErrorDetail::new(
                "timeout",
                format!("case exceeded timeoutSec={timeout_sec}"),
            )),
            runner_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Timeout).unwrap(), "\"timeout\"");
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = RunnerResult {
            schema_version: "1".to_string(),
            run_type: "testCase".to_string(),
            test_id: "CpuStress".to_string(),
            test_version: "1.0.0".to_string(),
            status: RunStatus::Passed,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            exit_code: Some(0),
            metrics: None,
            effective_inputs: serde_json::json!({}),
            error: None,
            runner_info: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: RunnerResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, RunStatus::Passed);
        assert_eq!(back.test_id, "CpuStress");
    }
}
