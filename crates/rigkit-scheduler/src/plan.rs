//! Plan execution: an ordered list of suite references, run sequentially
//! (SPEC_FULL.md §4.8 / spec.md §4.8, §6.4).
//!
//! A plan has no `controls` block of its own — repeat, retry, and
//! `continueOnFailure` are suite-level concepts (spec.md §4.8 only defines
//! them "from suite controls"). A plan therefore always runs every suite in
//! its list to completion; cancellation is the only thing that stops it
//! early, in which case every suite that has not yet started is recorded as
//! `aborted` without ever resolving its nodes.

use std::collections::BTreeMap;

use chrono::Utc;
use rigkit_artifacts::{EngineEvent, IndexEntry, RunFolder, RunsIndex};
use rigkit_manifest::Identity;
use rigkit_report::{PlannedNode, RunType};
use rigkit_runner::RunStatus;

use crate::aggregate::aggregate_status;
use crate::error::SchedulerError;
use crate::suite;
use crate::SchedulerContext;

pub struct PlanRunOutcome {
    pub run_id: String,
    pub status: RunStatus,
}

/// Run one plan to a terminal aggregate status.
pub fn execute_plan(
    ctx: &SchedulerContext<'_>,
    plan_identity: &Identity,
    request_environment_overrides: Option<&BTreeMap<String, String>>,
) -> Result<PlanRunOutcome, SchedulerError> {
    let entry = ctx
        .catalog
        .plans
        .get(plan_identity)
        .ok_or_else(|| SchedulerError::NotFound { entity_type: "plan", identity: plan_identity.to_string() })?;
    let plan = entry.descriptor.clone();
    let plan_folder = entry.folder_path.clone();

    // Preflight: every suite reference must resolve before any run folder
    // exists for this plan, mirroring the suite-level preflight in
    // `suite::execute_suite` (spec.md §8 scenario 5 generalizes to plans).
    let mut suite_identities = Vec::with_capacity(plan.nodes.len());
    for suite_node in &plan.nodes {
        let suite_identity = rigkit_resolve::resolve_suite_reference(
            &suite_node.suite_ref,
            &plan_folder,
            &ctx.catalog.suites_root,
            ctx.catalog,
        )?;
        suite_identities.push((suite_node.node_id.clone(), suite_identity));
    }

    let run_id = rigkit_utils::run_id::generate();
    let run_folder = RunFolder::create(ctx.runs_root, &run_id)?;
    let index = RunsIndex::new(ctx.runs_root);
    let start_time = Utc::now();

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "plan".to_string(),
        node_id: None,
        test_id: None,
        test_version: None,
        suite_id: None,
        suite_version: None,
        plan_id: Some(plan_identity.id().to_string()),
        plan_version: Some(plan_identity.version().to_string()),
        parent_run_id: None,
        start_time,
        end_time: None,
        status: None,
    })?;

    let planned_nodes: Vec<PlannedNode> = suite_identities
        .iter()
        .map(|(node_id, identity)| PlannedNode {
            node_id: node_id.clone(),
            label: identity.to_string(),
            parent_node_id: None,
        })
        .collect();
    ctx.reporter.on_run_planned(&run_id, RunType::Plan, &planned_nodes);
    run_folder.append_event(&EngineEvent::RunPlanned {
        at: Utc::now(),
        run_id: run_id.clone(),
        run_type: "plan".to_string(),
        planned_nodes: serde_json::json!(planned_nodes.iter().map(|p| p.node_id.clone()).collect::<Vec<_>>()),
    })?;

    let plan_environment = if plan.environment.is_empty() { None } else { Some(&plan.environment) };

    let mut child_statuses = Vec::new();
    for (node_id, suite_identity) in &suite_identities {
        if ctx.cancel.is_cancelled() {
            child_statuses.push(RunStatus::Aborted);
            continue;
        }
        let outcome = suite::execute_suite(
            ctx,
            suite_identity,
            node_id,
            Some(&run_id),
            plan_environment,
            None,
            request_environment_overrides,
        )?;
        child_statuses.push(outcome.status);
    }

    let aggregate = aggregate_status(child_statuses);
    let end_time = Utc::now();
    run_folder.append_event(&EngineEvent::RunFinished {
        at: Utc::now(),
        run_id: run_id.clone(),
        status: aggregate.to_string(),
    })?;

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "plan".to_string(),
        node_id: None,
        test_id: None,
        test_version: None,
        suite_id: None,
        suite_version: None,
        plan_id: Some(plan_identity.id().to_string()),
        plan_version: Some(plan_identity.version().to_string()),
        parent_run_id: None,
        start_time,
        end_time: Some(end_time),
        status: Some(aggregate.to_string()),
    })?;

    ctx.reporter.on_run_finished(&run_id, aggregate);

    Ok(PlanRunOutcome { run_id, status: aggregate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigkit_catalog::discover;
    use rigkit_privilege::ElevationProbe;
    use rigkit_redact::SecretRedactor;
    use rigkit_report::{NullReporter, RecordingReporter};
    use rigkit_runner::{CaseRunner, CommandSpec, ErrorDetail, RunnerCommandFactory, RunnerInvocation, RunnerResult};
    use rigkit_utils::CancellationToken;
    use std::cell::RefCell;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct AlwaysElevated;
    impl ElevationProbe for AlwaysElevated {
        fn is_elevated(&self) -> bool {
            true
        }
    }

    struct NoopFactory;
    impl RunnerCommandFactory for NoopFactory {
        fn command_for(&self, _case_folder: &camino::Utf8Path, _run_folder: &camino::Utf8Path) -> CommandSpec {
            CommandSpec::new("true")
        }
    }

    struct ScriptedRunner {
        failing: Mutex<Vec<String>>,
    }

    impl CaseRunner for ScriptedRunner {
        fn run(&self, invocation: &RunnerInvocation, _cancel: &CancellationToken) -> RunnerResult {
            let fails = self.failing.lock().expect("poisoned").contains(&invocation.test_id);
            RunnerResult {
                schema_version: "1".to_string(),
                run_type: "testCase".to_string(),
                test_id: invocation.test_id.clone(),
                test_version: invocation.test_version.clone(),
                status: if fails { RunStatus::Failed } else { RunStatus::Passed },
                start_time: Utc::now(),
                end_time: Utc::now(),
                exit_code: Some(if fails { 1 } else { 0 }),
                metrics: None,
                effective_inputs: invocation.effective_inputs_redacted.clone(),
                error: if fails { Some(ErrorDetail::new("scriptError", "simulated failure")) } else { None },
                runner_info: None,
            }
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

    fn write_suite(suites_root: &camino::Utf8Path, id: &str) {
        let dir = suites_root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"schemaVersion":"1","id":"{id}","version":"1.0.0",
                "cases":[{{"nodeId":"a","ref":"A@1.0.0"}}]}}"#
        );
        fs::write(dir.join(rigkit_catalog::SUITE_MANIFEST_FILE), json).unwrap();
    }

    fn write_plan(plans_root: &camino::Utf8Path, id: &str, suite_id: &str) {
        let dir = plans_root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let json = format!(
            r#"{{"schemaVersion":"1","id":"{id}","version":"1.0.0",
                "suites":[{{"nodeId":"s1","ref":"{suite_id}@1.0.0"}}]}}"#
        );
        fs::write(dir.join(rigkit_catalog::PLAN_MANIFEST_FILE), json).unwrap();
    }

    #[test]
    fn runs_every_suite_and_aggregates_status() {
        let tmp = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        let suites_root = root.join("suites");
        let plans_root = root.join("plans");
        write_case(&cases_root, "A");
        write_suite(&suites_root, "Smoke");
        write_plan(&plans_root, "Nightly", "Smoke");

        let report = discover(&cases_root, &suites_root, &plans_root).unwrap();
        let plan_identity = report.catalog.plans.keys().next().unwrap().clone();

        let runs_root = root.join("runs");
        let runner = ScriptedRunner { failing: Mutex::new(Vec::new()) };
        let factory = NoopFactory;
        let reporter = RecordingReporter::new();
        let cancel = CancellationToken::new();
        let redactor = RefCell::new(SecretRedactor::new());
        let probe = AlwaysElevated;

        let ctx = SchedulerContext {
            catalog: &report.catalog,
            runs_root: &runs_root,
            engine_version: "0.1.0",
            runner: &runner,
            command_factory: &factory,
            elevation_probe: &probe,
            reporter: &reporter,
            cancel: &cancel,
            redactor: &redactor,
            default_timeout_sec: 30,
        };

        let outcome = execute_plan(&ctx, &plan_identity, None).unwrap();
        assert_eq!(outcome.status, RunStatus::Passed);

        let children_path = runs_root.join(&outcome.run_id).join("children.jsonl");
        let content = fs::read_to_string(children_path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn unresolvable_suite_reference_aborts_with_no_run_folder() {
        let tmp = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let cases_root = root.join("cases");
        let suites_root = root.join("suites");
        let plans_root = root.join("plans");
        fs::create_dir_all(&cases_root).unwrap();
        fs::create_dir_all(&suites_root).unwrap();
        let dir = plans_root.join("Bad");
        fs::create_dir_all(&dir).unwrap();
        let json = r#"{"schemaVersion":"1","id":"Bad","version":"1.0.0",
            "suites":[{"nodeId":"s1","ref":"Nope@1.0.0"}]}"#;
        fs::write(dir.join(rigkit_catalog::PLAN_MANIFEST_FILE), json).unwrap();

        let report = discover(&cases_root, &suites_root, &plans_root).unwrap();
        let plan_identity = report.catalog.plans.keys().next().unwrap().clone();

        let runs_root = root.join("runs");
        let runner = ScriptedRunner { failing: Mutex::new(Vec::new()) };
        let factory = NoopFactory;
        let reporter = NullReporter;
        let cancel = CancellationToken::new();
        let redactor = RefCell::new(SecretRedactor::new());
        let probe = AlwaysElevated;

        let ctx = SchedulerContext {
            catalog: &report.catalog,
            runs_root: &runs_root,
            engine_version: "0.1.0",
            runner: &runner,
            command_factory: &factory,
            elevation_probe: &probe,
            reporter: &reporter,
            cancel: &cancel,
            redactor: &redactor,
            default_timeout_sec: 30,
        };

        let err = execute_plan(&ctx, &plan_identity, None).unwrap_err();
        assert!(matches!(err, SchedulerError::Reference(_)));
        assert!(!runs_root.exists());
    }
}
