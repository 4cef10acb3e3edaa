//! Single test-case execution: validation preflight, run-folder creation,
//! runner invocation, and the retry loop (SPEC_FULL.md §4.8 / spec.md §4.7,
//! §4.8).
//!
//! Reference resolution, input resolution, and the privilege gate all
//! happen in [`prepare_case`], before any run folder exists for this node.
//! That keeps the validation-error exit path exactly as described for
//! `rigkit_utils::exit_codes::ExitCode::VALIDATION`: discovery, reference,
//! inputs, and privilege failures all abort before a runner is invoked, and
//! none of them leave a half-written run folder behind.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::Utc;
use rigkit_artifacts::{ChildSummary, EngineEvent, IndexEntry, RunFolder, RunsIndex};
use rigkit_catalog::Catalog;
use rigkit_env::EffectiveEnv;
use rigkit_inputs::ResolvedInputs;
use rigkit_manifest::{Identity, RawInput, TestCaseDescriptor};
use rigkit_privilege::{ElevationProbe, PrivilegeOutcome};
use rigkit_redact::SecretRedactor;
use rigkit_report::{NodeState, ReporterBus};
use rigkit_runner::{CaseRunner, ErrorDetail, RunnerCommandFactory, RunnerInvocation, RunnerResult, RunStatus};
use rigkit_utils::CancellationToken;

use crate::error::SchedulerError;

/// Everything resolved about one case invocation before any side effect
/// (folder creation, runner spawn) happens.
pub struct PreparedCase {
    pub identity: Identity,
    pub descriptor: TestCaseDescriptor,
    pub case_folder: Utf8PathBuf,
    pub node_id: String,
    pub resolved_inputs: ResolvedInputs,
    pub timeout_sec: u64,
    pub privilege_outcome: PrivilegeOutcome,
}

fn trackable_string(value: &rigkit_values::Value) -> Option<String> {
    match value {
        rigkit_values::Value::String(s)
        | rigkit_values::Value::Path(s)
        | rigkit_values::Value::File(s)
        | rigkit_values::Value::Folder(s)
        | rigkit_values::Value::Enum(s) => Some(s.clone()),
        rigkit_values::Value::Int(i) => Some(i.to_string()),
        rigkit_values::Value::Double(d) => Some(d.to_string()),
        rigkit_values::Value::Boolean(b) => Some(b.to_string()),
        rigkit_values::Value::Json(j) => Some(j.to_string()),
    }
}

/// Resolve the case reference, its effective inputs, and the privilege
/// gate. Returns before any artifact is written.
#[allow(clippy::too_many_arguments)]
pub fn prepare_case(
    catalog: &Catalog,
    identity: &Identity,
    node_id: &str,
    suite_node_inputs: Option<&BTreeMap<String, RawInput>>,
    request_overrides: Option<&BTreeMap<String, RawInput>>,
    env: &EffectiveEnv,
    default_timeout_sec: u64,
    elevation_probe: &dyn ElevationProbe,
    redactor: &RefCell<SecretRedactor>,
) -> Result<PreparedCase, SchedulerError> {
    let entry = catalog
        .cases
        .get(identity)
        .ok_or_else(|| SchedulerError::NotFound { entity_type: "testCase", identity: identity.to_string() })?;
    let descriptor = entry.descriptor.clone();

    let privilege_outcome = rigkit_privilege::check(descriptor.privilege, elevation_probe)?;

    let resolved_inputs =
        rigkit_inputs::resolve_inputs(&descriptor.parameters, node_id, suite_node_inputs, request_overrides, env)?;

    {
        let mut redactor = redactor.borrow_mut();
        for (name, value) in &resolved_inputs.values {
            if resolved_inputs.is_secret(name) {
                if let Some(literal) = trackable_string(value) {
                    redactor.track(literal);
                }
            }
        }
    }

    let timeout_sec = descriptor.timeout_sec.unwrap_or(default_timeout_sec);

    Ok(PreparedCase {
        identity: identity.clone(),
        descriptor,
        case_folder: entry.folder_path.clone(),
        node_id: node_id.to_string(),
        resolved_inputs,
        timeout_sec,
        privilege_outcome,
    })
}

/// Outcome of running one case to a terminal state, including every retry
/// attempt that was exhausted.
pub struct CaseRunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub retry_count: u32,
}

/// Dependencies shared by every case attempt within one engine invocation.
pub struct CaseExecutionContext<'a> {
    pub runs_root: &'a camino::Utf8Path,
    pub engine_version: &'a str,
    pub runner: &'a dyn CaseRunner,
    pub command_factory: &'a dyn RunnerCommandFactory,
    pub reporter: &'a dyn ReporterBus,
    pub cancel: &'a CancellationToken,
    pub redactor: &'a RefCell<SecretRedactor>,
}

/// Run one case to a terminal state, retrying up to `retry_on_error`
/// additional times if the attempt ends in `error` or `timeout`
/// (spec.md §4.8: "a subsequent success replaces the prior terminal status
/// for aggregation purposes").
pub fn execute_case_with_retry(
    ctx: &CaseExecutionContext<'_>,
    prepared: &PreparedCase,
    parent_run_id: Option<&str>,
    effective_env: &EffectiveEnv,
    retry_on_error: u32,
) -> Result<CaseRunOutcome, SchedulerError> {
    let mut attempt = 0u32;
    loop {
        let outcome = execute_one_attempt(ctx, prepared, parent_run_id, effective_env, attempt)?;
        let retryable = matches!(outcome.status, RunStatus::Error | RunStatus::Timeout);
        if retryable && attempt < retry_on_error {
            attempt += 1;
            continue;
        }
        return Ok(outcome);
    }
}

fn build_invocation(
    ctx: &CaseExecutionContext<'_>,
    prepared: &PreparedCase,
    run_folder: &RunFolder,
    effective_env: &EffectiveEnv,
) -> RunnerInvocation {
    let command = ctx
        .command_factory
        .command_for(&prepared.case_folder, run_folder.path())
        .envs(effective_env.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let redacted_inputs: serde_json::Value =
        serde_json::Value::Object(prepared.resolved_inputs.to_redacted_json().into_iter().collect());

    let stdin_payload = serde_json::json!({
        "schemaVersion": "1",
        "runFolder": run_folder.path().as_str(),
        "testId": prepared.identity.id(),
        "testVersion": prepared.identity.version(),
        "effectiveInputs": prepared.resolved_inputs.to_json(),
        "timeoutSec": prepared.timeout_sec,
        "engineVersion": ctx.engine_version,
    });

    RunnerInvocation {
        command,
        run_folder: run_folder.path().to_path_buf(),
        stdin_payload,
        timeout: Duration::from_secs(prepared.timeout_sec),
        test_id: prepared.identity.id().to_string(),
        test_version: prepared.identity.version().to_string(),
        effective_inputs_redacted: redacted_inputs,
    }
}

/// Scrub any tracked secret literal out of a result's free-text fields
/// before it is persisted, and overwrite the echoed `effectiveInputs` with
/// the engine's own redacted mirror rather than trusting what the runner
/// sent back. This closes off the runner process as a leak vector for the
/// raw secret value it was handed over stdin.
fn scrub_result(redactor: &SecretRedactor, mut result: RunnerResult, redacted_inputs: &serde_json::Value) -> RunnerResult {
    result.effective_inputs = redacted_inputs.clone();
    if let Some(error) = result.error.as_mut() {
        error.message = redactor.redact_string(&error.message);
        if let Some(stack) = error.stack.as_mut() {
            *stack = redactor.redact_string(stack);
        }
        if redactor.contains_secret(&error.message) || error.stack.as_deref().is_some_and(|s| redactor.contains_secret(s)) {
            tracing::error!("secret literal survived redaction, replacing error detail wholesale");
            error.message = "redacted: error detail withheld to avoid leaking a secret value".to_string();
            error.stack = None;
        }
    }
    result
}

fn execute_one_attempt(
    ctx: &CaseExecutionContext<'_>,
    prepared: &PreparedCase,
    parent_run_id: Option<&str>,
    effective_env: &EffectiveEnv,
    retry_count: u32,
) -> Result<CaseRunOutcome, SchedulerError> {
    let run_id = rigkit_utils::run_id::generate();
    ctx.reporter.on_node_started(parent_run_id.unwrap_or(&run_id), &prepared.node_id);

    let run_folder = RunFolder::create(ctx.runs_root, &run_id)?;
    let index = RunsIndex::new(ctx.runs_root);
    let start_time = Utc::now();

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "case".to_string(),
        node_id: Some(prepared.node_id.clone()),
        test_id: Some(prepared.identity.id().to_string()),
        test_version: Some(prepared.identity.version().to_string()),
        suite_id: None,
        suite_version: None,
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: None,
        status: None,
    })?;

    let manifest_json = serde_json::to_value(&prepared.descriptor).unwrap_or(serde_json::Value::Null);
    run_folder.write_manifest(&manifest_json)?;
    let params_json = serde_json::Value::Object(prepared.resolved_inputs.to_redacted_json().into_iter().collect());
    run_folder.write_params(&params_json)?;
    let env_json = serde_json::Value::Object(
        effective_env.to_redacted_map().into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect(),
    );
    run_folder.write_env(&env_json)?;

    if prepared.privilege_outcome == PrivilegeOutcome::PreferredButNotElevated {
        run_folder.append_event(&EngineEvent::Warning {
            at: Utc::now(),
            code: "Privilege.AdminPreferred.NotElevated".to_string(),
            message: format!("case '{}' prefers elevation but the current process is not elevated", prepared.identity),
        })?;
    }

    let invocation = build_invocation(ctx, prepared, &run_folder, effective_env);
    let raw_result = ctx.runner.run(&invocation, ctx.cancel);
    let result = scrub_result(&ctx.redactor.borrow(), raw_result, &invocation.effective_inputs_redacted);

    run_folder.write_result_atomic(&result)?;
    let end_time = result.end_time;

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "case".to_string(),
        node_id: Some(prepared.node_id.clone()),
        test_id: Some(prepared.identity.id().to_string()),
        test_version: Some(prepared.identity.version().to_string()),
        suite_id: None,
        suite_version: None,
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: Some(end_time),
        status: Some(result.status.to_string()),
    })?;

    if let Some(parent_id) = parent_run_id {
        let parent_folder = RunFolder::create(ctx.runs_root, parent_id)?;
        parent_folder.append_child(&ChildSummary {
            run_id: run_id.clone(),
            node_id: prepared.node_id.clone(),
            test_id: Some(prepared.identity.id().to_string()),
            test_version: Some(prepared.identity.version().to_string()),
            status: result.status.to_string(),
            retry_count,
            start_time,
            end_time,
        })?;
    }

    run_folder.append_event(&EngineEvent::NodeFinished {
        at: Utc::now(),
        run_id: run_id.clone(),
        node_id: prepared.node_id.clone(),
        status: result.status.to_string(),
    })?;
    run_folder.append_event(&EngineEvent::RunFinished { at: Utc::now(), run_id: run_id.clone(), status: result.status.to_string() })?;

    ctx.reporter.on_node_finished(
        parent_run_id.unwrap_or(&run_id),
        &NodeState { node_id: prepared.node_id.clone(), status: result.status, retry_count },
    );

    Ok(CaseRunOutcome { run_id, status: result.status, retry_count })
}

/// Record a node as `aborted` without ever invoking its runner: used when a
/// prior sibling's non-passed status already stopped the suite (or a
/// cancellation arrived) before this node's turn came up (spec.md §8
/// invariant: "for all cancellations issued before a node starts, that
/// node's status is `aborted`").
pub fn record_synthetic_aborted(
    ctx: &CaseExecutionContext<'_>,
    prepared: &PreparedCase,
    parent_run_id: Option<&str>,
    effective_env: &EffectiveEnv,
    reason: &str,
) -> Result<CaseRunOutcome, SchedulerError> {
    let run_id = rigkit_utils::run_id::generate();
    ctx.reporter.on_node_started(parent_run_id.unwrap_or(&run_id), &prepared.node_id);

    let run_folder = RunFolder::create(ctx.runs_root, &run_id)?;
    let index = RunsIndex::new(ctx.runs_root);
    let start_time = Utc::now();

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "case".to_string(),
        node_id: Some(prepared.node_id.clone()),
        test_id: Some(prepared.identity.id().to_string()),
        test_version: Some(prepared.identity.version().to_string()),
        suite_id: None,
        suite_version: None,
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: None,
        status: None,
    })?;

    let manifest_json = serde_json::to_value(&prepared.descriptor).unwrap_or(serde_json::Value::Null);
    run_folder.write_manifest(&manifest_json)?;
    let params_json = serde_json::Value::Object(prepared.resolved_inputs.to_redacted_json().into_iter().collect());
    run_folder.write_params(&params_json)?;
    let env_json = serde_json::Value::Object(
        effective_env.to_redacted_map().into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect(),
    );
    run_folder.write_env(&env_json)?;

    let end_time = Utc::now();
    let result = RunnerResult {
        schema_version: "1".to_string(),
        run_type: "testCase".to_string(),
        test_id: prepared.identity.id().to_string(),
        test_version: prepared.identity.version().to_string(),
        status: RunStatus::Aborted,
        start_time,
        end_time,
        exit_code: None,
        metrics: None,
        effective_inputs: params_json,
        error: Some(ErrorDetail::new("aborted", reason)),
        runner_info: None,
    };
    run_folder.write_result_atomic(&result)?;

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "case".to_string(),
        node_id: Some(prepared.node_id.clone()),
        test_id: Some(prepared.identity.id().to_string()),
        test_version: Some(prepared.identity.version().to_string()),
        suite_id: None,
        suite_version: None,
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: Some(end_time),
        status: Some(RunStatus::Aborted.to_string()),
    })?;

    if let Some(parent_id) = parent_run_id {
        let parent_folder = RunFolder::create(ctx.runs_root, parent_id)?;
        parent_folder.append_child(&ChildSummary {
            run_id: run_id.clone(),
            node_id: prepared.node_id.clone(),
            test_id: Some(prepared.identity.id().to_string()),
            test_version: Some(prepared.identity.version().to_string()),
            status: RunStatus::Aborted.to_string(),
            retry_count: 0,
            start_time,
            end_time,
        })?;
    }

    run_folder.append_event(&EngineEvent::NodeFinished {
        at: Utc::now(),
        run_id: run_id.clone(),
        node_id: prepared.node_id.clone(),
        status: RunStatus::Aborted.to_string(),
    })?;
    run_folder.append_event(&EngineEvent::RunFinished {
        at: Utc::now(),
        run_id: run_id.clone(),
        status: RunStatus::Aborted.to_string(),
    })?;

    ctx.reporter.on_node_finished(
        parent_run_id.unwrap_or(&run_id),
        &NodeState { node_id: prepared.node_id.clone(), status: RunStatus::Aborted, retry_count: 0 },
    );

    Ok(CaseRunOutcome { run_id, status: RunStatus::Aborted, retry_count: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigkit_catalog::discover;
    use rigkit_manifest::Privilege;
    use rigkit_privilege::ElevationProbe;
    use rigkit_report::NullReporter;
    use rigkit_runner::CommandSpec;
    use std::fs;
    use tempfile::TempDir;

    struct AlwaysElevated;
    impl ElevationProbe for AlwaysElevated {
        fn is_elevated(&self) -> bool {
            true
        }
    }

    struct NeverElevated;
    impl ElevationProbe for NeverElevated {
        fn is_elevated(&self) -> bool {
            false
        }
    }

    struct FakeRunner(RunStatus);
    impl CaseRunner for FakeRunner {
        fn run(&self, invocation: &RunnerInvocation, _cancel: &CancellationToken) -> RunnerResult {
            RunnerResult {
                schema_version: "1".to_string(),
                run_type: "testCase".to_string(),
                test_id: invocation.test_id.clone(),
                test_version: invocation.test_version.clone(),
                status: self.0,
                start_time: Utc::now(),
                end_time: Utc::now(),
                exit_code: Some(0),
                metrics: None,
                effective_inputs: invocation.stdin_payload["effectiveInputs"].clone(),
                error: if self.0 == RunStatus::Passed {
                    None
                } else {
                    Some(ErrorDetail::new("simulated", "simulated failure"))
                },
                runner_info: None,
            }
        }
    }

    struct NoopFactory;
    impl RunnerCommandFactory for NoopFactory {
        fn command_for(&self, _case_folder: &camino::Utf8Path, _run_folder: &camino::Utf8Path) -> CommandSpec {
            CommandSpec::new("true")
        }
    }

    fn write_case(cases_root: &camino::Utf8Path, id: &str) {
        let dir = cases_root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"schemaVersion":"1","id":"{id}","version":"1.0.0","name":"n","category":"c","timeoutSec":5}}"#
        );
        fs::write(dir.join(rigkit_catalog::CASE_MANIFEST_FILE), json).unwrap();
    }

    #[test]
    fn admin_required_case_fails_preparation_when_not_elevated() {
        let tmp = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        write_case(&cases_root, "NeedsAdmin");
        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        let mut descriptor = report.catalog.cases.values().next().unwrap().descriptor.clone();
        descriptor.privilege = Some(Privilege::AdminRequired);

        let mut catalog = report.catalog;
        let identity = descriptor.identity().unwrap();
        catalog.cases.get_mut(&identity).unwrap().descriptor = descriptor;

        let env = EffectiveEnv::new();
        let redactor = RefCell::new(SecretRedactor::new());
        let err = prepare_case(&catalog, &identity, "n1", None, None, &env, 30, &NeverElevated, &redactor).unwrap_err();
        assert!(matches!(err, SchedulerError::Privilege(_)));
    }

    #[test]
    fn execute_case_with_retry_exhausts_retries_on_persistent_error() {
        let tmp = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        write_case(&cases_root, "AlwaysErrors");
        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        let identity = report.catalog.cases.keys().next().unwrap().clone();

        let env = EffectiveEnv::new();
        let redactor = RefCell::new(SecretRedactor::new());
        let prepared =
            prepare_case(&report.catalog, &identity, "n1", None, None, &env, 30, &AlwaysElevated, &redactor).unwrap();

        let runs_root = root.join("runs");
        let runner = FakeRunner(RunStatus::Error);
        let factory = NoopFactory;
        let reporter = NullReporter;
        let cancel = CancellationToken::new();
        let ctx = CaseExecutionContext {
            runs_root: &runs_root,
            engine_version: "0.1.0",
            runner: &runner,
            command_factory: &factory,
            reporter: &reporter,
            cancel: &cancel,
            redactor: &redactor,
        };

        let outcome = execute_case_with_retry(&ctx, &prepared, None, &env, 2).unwrap();
        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.retry_count, 2);
    }

    #[test]
    fn execute_case_with_retry_stops_at_first_success() {
        let tmp = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        write_case(&cases_root, "EventuallyPasses");
        let report = discover(&cases_root, &root.join("suites"), &root.join("plans")).unwrap();
        let identity = report.catalog.cases.keys().next().unwrap().clone();

        let env = EffectiveEnv::new();
        let redactor = RefCell::new(SecretRedactor::new());
        let prepared =
            prepare_case(&report.catalog, &identity, "n1", None, None, &env, 30, &AlwaysElevated, &redactor).unwrap();

        let runs_root = root.join("runs");
        let runner = FakeRunner(RunStatus::Passed);
        let factory = NoopFactory;
        let reporter = NullReporter;
        let cancel = CancellationToken::new();
        let ctx = CaseExecutionContext {
            runs_root: &runs_root,
            engine_version: "0.1.0",
            runner: &runner,
            command_factory: &factory,
            reporter: &reporter,
            cancel: &cancel,
            redactor: &redactor,
        };

        let outcome = execute_case_with_retry(&ctx, &prepared, None, &env, 3).unwrap();
        assert_eq!(outcome.status, RunStatus::Passed);
        assert_eq!(outcome.retry_count, 0);
    }
}
