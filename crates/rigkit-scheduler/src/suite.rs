//! Suite execution: sequential node iteration honoring `continueOnFailure`,
//! `repeat`, `retryOnError`, and `timeoutPolicy` (SPEC_FULL.md §4.8 /
//! spec.md §4.8).
//!
//! Cases within a suite always execute strictly sequentially — even when
//! `controls.maxParallel > 1` is declared, it is accepted syntactically and
//! then ignored with a warning event, since tests are not assumed to be
//! isolated from shared machine state (spec.md §4.8 rationale).

use std::collections::BTreeMap;

use chrono::Utc;
use rigkit_artifacts::{ChildSummary, EngineEvent, IndexEntry, RunFolder, RunsIndex};
use rigkit_env::{EffectiveEnv, EnvLayer};
use rigkit_manifest::{Identity, RawInput, TimeoutPolicy};
use rigkit_report::{PlannedNode, RunType};
use rigkit_runner::RunStatus;

use crate::aggregate::aggregate_status;
use crate::case;
use crate::error::SchedulerError;
use crate::SchedulerContext;

pub struct SuiteRunOutcome {
    pub run_id: String,
    pub status: RunStatus,
}

fn compose_environment(
    suite_environment: &BTreeMap<String, String>,
    plan_environment: Option<&BTreeMap<String, String>>,
    request_environment_overrides: Option<&BTreeMap<String, String>>,
) -> Result<EffectiveEnv, SchedulerError> {
    let mut env = EffectiveEnv::new();
    env.apply_layer(EnvLayer::Os, rigkit_env::os_snapshot())?;
    if let Some(plan_env) = plan_environment {
        env.apply_layer(EnvLayer::Plan, plan_env.clone())?;
    }
    env.apply_layer(EnvLayer::Suite, suite_environment.clone())?;
    if let Some(overrides) = request_environment_overrides {
        env.apply_layer(EnvLayer::Override, overrides.clone())?;
    }
    Ok(env)
}

/// Should the suite stop after a node ended with `status`, given its
/// declared `timeoutPolicy` and `continueOnFailure`? (spec.md §4.8:
/// "`timeoutPolicy` ... governs how a `timeout` interacts with
/// `continueOnFailure`".)
fn should_stop(status: RunStatus, continue_on_failure: bool, timeout_policy: TimeoutPolicy) -> bool {
    if status == RunStatus::Passed {
        return false;
    }
    if status == RunStatus::Timeout && timeout_policy == TimeoutPolicy::AbortSuite {
        return true;
    }
    !continue_on_failure
}

/// Run one suite to a terminal aggregate status.
///
/// `node_id` is this suite's identifier within its parent's node list (used
/// only to label the `children.jsonl` entry appended to `parent_run_id`);
/// pass the suite's own `id@version` string when the suite is the
/// top-level target of a `RunRequest`.
pub fn execute_suite(
    ctx: &SchedulerContext<'_>,
    suite_identity: &Identity,
    node_id: &str,
    parent_run_id: Option<&str>,
    plan_environment: Option<&BTreeMap<String, String>>,
    node_overrides: Option<&BTreeMap<String, BTreeMap<String, RawInput>>>,
    request_environment_overrides: Option<&BTreeMap<String, String>>,
) -> Result<SuiteRunOutcome, SchedulerError> {
    let entry = ctx
        .catalog
        .suites
        .get(suite_identity)
        .ok_or_else(|| SchedulerError::NotFound { entity_type: "suite", identity: suite_identity.to_string() })?;
    let suite = entry.descriptor.clone();
    let suite_folder = entry.folder_path.clone();

    let env = compose_environment(&suite.environment, plan_environment, request_environment_overrides)?;

    // Preflight: resolve every node's case reference and effective inputs
    // before any run folder exists for this suite. A single bad reference
    // or input aborts the whole suite request with no artifacts written
    // (spec.md §8 scenario 5).
    let mut prepared_nodes = Vec::with_capacity(suite.nodes.len());
    for suite_node in &suite.nodes {
        let case_identity = rigkit_resolve::resolve_case_reference(
            &suite_node.case_ref,
            &suite_folder,
            &ctx.catalog.cases_root,
            ctx.catalog,
        )?;
        let suite_node_inputs = if suite_node.inputs.is_empty() { None } else { Some(&suite_node.inputs) };
        let request_overrides = node_overrides.and_then(|m| m.get(&suite_node.node_id));
        let prepared = case::prepare_case(
            ctx.catalog,
            &case_identity,
            &suite_node.node_id,
            suite_node_inputs,
            request_overrides,
            &env,
            ctx.default_timeout_sec,
            ctx.elevation_probe,
            ctx.redactor,
        )?;
        prepared_nodes.push(prepared);
    }

    let run_id = rigkit_utils::run_id::generate();
    let run_folder = RunFolder::create(ctx.runs_root, &run_id)?;
    let index = RunsIndex::new(ctx.runs_root);
    let start_time = Utc::now();

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "suite".to_string(),
        node_id: None,
        test_id: None,
        test_version: None,
        suite_id: Some(suite_identity.id().to_string()),
        suite_version: Some(suite_identity.version().to_string()),
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: None,
        status: None,
    })?;

    let planned_nodes: Vec<PlannedNode> = prepared_nodes
        .iter()
        .map(|p| PlannedNode { node_id: p.node_id.clone(), label: p.identity.to_string(), parent_node_id: None })
        .collect();
    ctx.reporter.on_run_planned(&run_id, RunType::Suite, &planned_nodes);
    run_folder.append_event(&EngineEvent::RunPlanned {
        at: Utc::now(),
        run_id: run_id.clone(),
        run_type: "suite".to_string(),
        planned_nodes: serde_json::json!(planned_nodes.iter().map(|p| p.node_id.clone()).collect::<Vec<_>>()),
    })?;

    if suite.controls.max_parallel.is_some_and(|m| m > 1) {
        run_folder.append_event(&EngineEvent::Warning {
            at: Utc::now(),
            code: "Controls.MaxParallel.Ignored".to_string(),
            message: "maxParallel > 1 is accepted syntactically but ignored; nodes execute strictly sequentially"
                .to_string(),
        })?;
    }

    let retry_on_error = suite.controls.retry_on_error.unwrap_or(0);
    let continue_on_failure = suite.controls.continue_on_failure.unwrap_or(false);
    let timeout_policy = suite.controls.timeout_policy.unwrap_or_default();
    let repeat = suite.controls.repeat.unwrap_or(1).max(1);

    let case_ctx = ctx.case_ctx();
    let mut child_statuses = Vec::new();
    let mut stopped = false;

    for prepared in &prepared_nodes {
        for _ in 0..repeat {
            if stopped || ctx.cancel.is_cancelled() {
                let outcome = case::record_synthetic_aborted(
                    &case_ctx,
                    prepared,
                    Some(&run_id),
                    &env,
                    "suite stopped before this node ran",
                )?;
                child_statuses.push(outcome.status);
                continue;
            }

            let outcome = case::execute_case_with_retry(&case_ctx, prepared, Some(&run_id), &env, retry_on_error)?;
            let node_stopped = should_stop(outcome.status, continue_on_failure, timeout_policy);
            child_statuses.push(outcome.status);
            if node_stopped {
                stopped = true;
            }
        }
    }

    let aggregate = aggregate_status(child_statuses);
    let end_time = Utc::now();
    run_folder.append_event(&EngineEvent::RunFinished { at: Utc::now(), run_id: run_id.clone(), status: aggregate.to_string() })?;

    index.append(&IndexEntry {
        run_id: run_id.clone(),
        run_type: "suite".to_string(),
        node_id: None,
        test_id: None,
        test_version: None,
        suite_id: Some(suite_identity.id().to_string()),
        suite_version: Some(suite_identity.version().to_string()),
        plan_id: None,
        plan_version: None,
        parent_run_id: parent_run_id.map(str::to_string),
        start_time,
        end_time: Some(end_time),
        status: Some(aggregate.to_string()),
    })?;

    if let Some(parent_id) = parent_run_id {
        let parent_folder = RunFolder::create(ctx.runs_root, parent_id)?;
        parent_folder.append_child(&ChildSummary {
            run_id: run_id.clone(),
            node_id: node_id.to_string(),
            test_id: None,
            test_version: None,
            status: aggregate.to_string(),
            retry_count: 0,
            start_time,
            end_time,
        })?;
    }

    ctx.reporter.on_run_finished(&run_id, aggregate);

    Ok(SuiteRunOutcome { run_id, status: aggregate })
}
