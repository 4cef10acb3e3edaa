//! End-to-end scenarios driven through the `Engine` facade (spec.md §8,
//! SPEC_FULL.md §8): discovery, reference resolution, input resolution, the
//! scheduler, artifact writing, and the reporter bus wired together.
//! `CaseRunner` is a fake that scripts its own outcome rather than spawning
//! a real process.

use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use rigkit_config::{ElevationOverride, EngineConfig};
use rigkit_engine::{reject_plan_input_overrides, Engine, RunRequest};
use rigkit_manifest::Identity;
use rigkit_report::NullReporter;
use rigkit_runner::{CaseRunner, CommandSpec, ErrorDetail, RunnerCommandFactory, RunnerInvocation, RunnerResult, RunStatus};
use rigkit_utils::CancellationToken;
use tempfile::TempDir;

/// Scripted outcomes per `testId`, consumed in call order; the last
/// scripted outcome repeats once exhausted.
struct ScriptedRunner {
    outcomes: Mutex<BTreeMap<String, Vec<RunStatus>>>,
}

impl ScriptedRunner {
    fn new(script: Vec<(&str, Vec<RunStatus>)>) -> Self {
        let outcomes = script.into_iter().map(|(id, statuses)| (id.to_string(), statuses)).collect();
        Self { outcomes: Mutex::new(outcomes) }
    }
}

impl CaseRunner for ScriptedRunner {
    fn run(&self, invocation: &RunnerInvocation, _cancel: &CancellationToken) -> RunnerResult {
        let mut outcomes = self.outcomes.lock().expect("poisoned");
        let queue = outcomes.entry(invocation.test_id.clone()).or_insert_with(|| vec![RunStatus::Passed]);
        let status = if queue.len() > 1 { queue.remove(0) } else { queue[0] };
        RunnerResult {
            schema_version: "1".to_string(),
            run_type: "testCase".to_string(),
            test_id: invocation.test_id.clone(),
            test_version: invocation.test_version.clone(),
            status,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            exit_code: Some(if status == RunStatus::Passed { 0 } else { 1 }),
            metrics: None,
            effective_inputs: invocation.effective_inputs_redacted.clone(),
            error: if status == RunStatus::Passed {
                None
            } else {
                Some(ErrorDetail::new("scriptError", "simulated non-passed outcome"))
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

fn write_case(cases_root: &camino::Utf8Path, id: &str, extra_fields: &str) {
    let dir = cases_root.join(id);
    fs::create_dir_all(&dir).unwrap();
    let json = format!(
        r#"{{"schemaVersion":"1","id":"{id}","version":"1.0.0","name":"n","category":"c","timeoutSec":5{extra_fields}}}"#
    );
    fs::write(dir.join(rigkit_catalog::CASE_MANIFEST_FILE), json).unwrap();
}

fn write_suite(suites_root: &camino::Utf8Path, id: &str, controls: &str, case_refs: &[(&str, &str)]) {
    let dir = suites_root.join(id);
    fs::create_dir_all(&dir).unwrap();
    let nodes: Vec<String> =
        case_refs.iter().map(|(node_id, case_ref)| format!(r#"{{"nodeId":"{node_id}","ref":"{case_ref}"}}"#)).collect();
    let json = format!(
        r#"{{"schemaVersion":"1","id":"{id}","version":"1.0.0","controls":{controls},"cases":[{}]}}"#,
        nodes.join(",")
    );
    fs::write(dir.join(rigkit_catalog::SUITE_MANIFEST_FILE), json).unwrap();
}

fn build_engine(root: &camino::Utf8Path, runner: ScriptedRunner) -> Engine {
    let config = EngineConfig {
        cases_root: root.join("cases"),
        suites_root: root.join("suites"),
        plans_root: root.join("plans"),
        runs_root: root.join("runs"),
        default_timeout_sec: 30,
        elevation_override: ElevationOverride::ForceElevated,
    };
    let report = Engine::discover(&config).unwrap();
    assert!(report.errors.is_empty(), "unexpected discovery errors: {:?}", report.errors.iter().map(|e| &e.message).collect::<Vec<_>>());
    Engine::new(&config, report.catalog, "0.1.0", Box::new(runner), Box::new(NoopFactory), Box::new(NullReporter))
}

fn tmp_root() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, root)
}

/// Scenario 1: a single case passes. One run folder, terminal `passed`, no
/// `children.jsonl`.
#[test]
fn single_case_passes() {
    let (_tmp, root) = tmp_root();
    write_case(&root.join("cases"), "CpuStress", "");
    let engine = build_engine(&root, ScriptedRunner::new(vec![]));

    let identity = Identity::from_str("CpuStress@1.0.0").unwrap();
    let outcome = engine.run(&RunRequest::for_case(identity, None, None)).unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    let run_dir = root.join("runs").join(&outcome.run_id);
    assert!(run_dir.join("result.json").is_file());
    assert!(!run_dir.join("children.jsonl").is_file());
}

/// Scenario 2: a suite's middle node fails with `continueOnFailure=false`.
/// The trailing node is recorded `aborted`; the suite aggregates `failed`.
#[test]
fn suite_with_failing_middle_case_aborts_remainder() {
    let (_tmp, root) = tmp_root();
    for id in ["A", "B", "C"] {
        write_case(&root.join("cases"), id, "");
    }
    write_suite(&root.join("suites"), "Smoke", r#"{"continueOnFailure":false}"#, &[("a", "A@1.0.0"), ("b", "B@1.0.0"), ("c", "C@1.0.0")]);
    let runner = ScriptedRunner::new(vec![("B", vec![RunStatus::Failed])]);
    let engine = build_engine(&root, runner);

    let identity = Identity::from_str("Smoke@1.0.0").unwrap();
    let outcome = engine.run(&RunRequest::for_suite(identity, None, None)).unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    let children = fs::read_to_string(root.join("runs").join(&outcome.run_id).join("children.jsonl")).unwrap();
    let lines: Vec<&str> = children.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("\"status\":\"passed\""));
    assert!(lines[1].contains("\"status\":\"failed\""));
    assert!(lines[2].contains("\"status\":\"aborted\""));
}

/// Scenario 3: a case configured with `retryOnError=2` errors once, then
/// passes; the suite aggregates `passed` and both attempts are recorded.
#[test]
fn retry_recovers_from_error() {
    let (_tmp, root) = tmp_root();
    write_case(&root.join("cases"), "Flaky", "");
    write_suite(&root.join("suites"), "Retrying", r#"{"retryOnError":2}"#, &[("n1", "Flaky@1.0.0")]);
    let runner = ScriptedRunner::new(vec![("Flaky", vec![RunStatus::Error, RunStatus::Passed])]);
    let engine = build_engine(&root, runner);

    let identity = Identity::from_str("Retrying@1.0.0").unwrap();
    let outcome = engine.run(&RunRequest::for_suite(identity, None, None)).unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    let children = fs::read_to_string(root.join("runs").join(&outcome.run_id).join("children.jsonl")).unwrap();
    assert_eq!(children.lines().count(), 1);
    assert!(children.contains("\"retryCount\":1"));
    assert!(children.contains("\"status\":\"passed\""));
}

/// Scenario 4: a parameter bound to a secret env-ref is substituted with
/// its raw value for the runner, but `params.json` never contains it.
#[test]
fn secret_env_ref_is_redacted_in_params_json() {
    let (_tmp, root) = tmp_root();
    write_case(
        &root.join("cases"),
        "Authenticated",
        r#","parameters":[{"name":"Token","type":"string","default":{"$env":{"var":"API_TOKEN","secret":true,"required":true}}}]"#,
    );
    let engine = build_engine(&root, ScriptedRunner::new(vec![]));

    let identity = Identity::from_str("Authenticated@1.0.0").unwrap();
    let mut env_overrides = BTreeMap::new();
    env_overrides.insert("API_TOKEN".to_string(), "abc123".to_string());
    let outcome = engine.run(&RunRequest::for_case(identity, None, Some(env_overrides))).unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    let run_dir = root.join("runs").join(&outcome.run_id);
    let params = fs::read_to_string(run_dir.join("params.json")).unwrap();
    assert!(params.contains("\"***\""));
    assert!(!params.contains("abc123"));
    let env_doc = fs::read_to_string(run_dir.join("env.json")).unwrap();
    assert!(!env_doc.contains("abc123"));
}

/// Scenario 5: a suite node reference that escapes its configured root is
/// rejected before any run folder is created.
#[test]
fn reference_escape_is_rejected_with_no_run_folder() {
    let (_tmp, root) = tmp_root();
    fs::create_dir_all(root.join("cases")).unwrap();
    let outside = root.join("outside").join("case");
    fs::create_dir_all(&outside).unwrap();
    fs::write(outside.join(rigkit_catalog::CASE_MANIFEST_FILE), r#"{"schemaVersion":"1","id":"Outside","version":"1.0.0","name":"n","category":"c"}"#).unwrap();
    write_suite(&root.join("suites"), "Bad", "{}", &[("a", "../../outside/case")]);
    let engine = build_engine(&root, ScriptedRunner::new(vec![]));

    let identity = Identity::from_str("Bad@1.0.0").unwrap();
    let err = engine.run(&RunRequest::for_suite(identity, None, None)).unwrap_err();

    assert!(err.is_validation_error());
    assert!(!root.join("runs").exists());
}

/// Scenario 6: a plan run never accepts case-input or node-input overrides.
/// The CLI-facing helper rejects the combination before a `RunRequest` is
/// even built; `RunRequest::for_plan` has no field to carry them at all.
#[test]
fn plan_input_overrides_are_rejected() {
    let err = reject_plan_input_overrides(true).unwrap_err();
    assert!(err.is_validation_error());
    assert!(reject_plan_input_overrides(false).is_ok());
}

/// Scenario 7: a case times out, and with `retryOnError=1` gets one retry
/// attempt before the suite records its final status.
#[test]
fn timeout_triggers_one_retry() {
    let (_tmp, root) = tmp_root();
    write_case(&root.join("cases"), "SlowBoot", "");
    write_suite(&root.join("suites"), "Boot", r#"{"retryOnError":1}"#, &[("n1", "SlowBoot@1.0.0")]);
    let runner = ScriptedRunner::new(vec![("SlowBoot", vec![RunStatus::Timeout, RunStatus::Passed])]);
    let engine = build_engine(&root, runner);

    let identity = Identity::from_str("Boot@1.0.0").unwrap();
    let outcome = engine.run(&RunRequest::for_suite(identity, None, None)).unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    let children = fs::read_to_string(root.join("runs").join(&outcome.run_id).join("children.jsonl")).unwrap();
    assert_eq!(children.lines().count(), 1);
    assert!(children.contains("\"retryCount\":1"));
}
