//! Main entry point: parse arguments, build the engine, run one request, map
//! the outcome to a process exit code (SPEC_FULL.md §3.1, §6).

use camino::Utf8PathBuf;
use rigkit_config::{ConfigOverrides, EngineConfig};
use rigkit_engine::{Engine, RunRequest};
use rigkit_runner::{ConfiguredCommandFactory, ProcessCaseRunner};
use rigkit_utils::exit_codes::ExitCode;
use rigkit_utils::logging::init_tracing;

use crate::args::{Cli, Commands, RunTarget};
use crate::commands::{parse_case_inputs, parse_env_overrides, parse_identity, parse_node_inputs};
use crate::reporter::TracingReporter;

const DEFAULT_CONFIG_PATH: &str = "rigkit.toml";
const DEFAULT_RUNNER: &str = "rigkit-script-host";

/// Parse `cli`, run the requested target, and return the process exit code.
/// Every failure path is mapped here so `main` only ever needs to call
/// `std::process::exit` once.
pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_PATH));
    let overrides = ConfigOverrides {
        cases_root: cli.cases_root.clone(),
        suites_root: cli.suites_root.clone(),
        plans_root: cli.plans_root.clone(),
        runs_root: cli.runs_root.clone(),
        default_timeout_sec: cli.default_timeout_sec,
        ..Default::default()
    };
    let config = match EngineConfig::load(&config_path, overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::INTERNAL;
        }
    };

    let report = match Engine::discover(&config) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "catalog discovery failed");
            return ExitCode::VALIDATION;
        }
    };
    for discovery_error in &report.errors {
        tracing::warn!(error = %discovery_error.message, "skipped a manifest during discovery");
    }

    if matches!(cli.command, Commands::Discover) {
        for identity in report.catalog.cases.keys() {
            println!("testCase\t{identity}");
        }
        for identity in report.catalog.suites.keys() {
            println!("suite\t{identity}");
        }
        for identity in report.catalog.plans.keys() {
            println!("plan\t{identity}");
        }
        return ExitCode::SUCCESS;
    }

    let runner_executable = cli.runner.clone().unwrap_or_else(|| DEFAULT_RUNNER.to_string());
    let engine = Engine::new(
        &config,
        report.catalog,
        env!("CARGO_PKG_VERSION"),
        Box::new(ProcessCaseRunner::new()),
        Box::new(ConfiguredCommandFactory::new(runner_executable)),
        Box::new(TracingReporter),
    );

    let request = match build_request(cli.command) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "invalid run request");
            return ExitCode::VALIDATION;
        }
    };

    match engine.run(&request) {
        Ok(outcome) => {
            println!("{}\t{}", outcome.run_id, outcome.status);
            if outcome.status == rigkit_runner::RunStatus::Passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::NOT_PASSED
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            if e.is_validation_error() {
                ExitCode::VALIDATION
            } else {
                ExitCode::INTERNAL
            }
        }
    }
}

fn build_request(command: Commands) -> anyhow::Result<RunRequest> {
    let Commands::Run { target } = command else {
        anyhow::bail!("discover has no run request");
    };
    match target {
        RunTarget::Case { identity, inputs, env } => {
            let identity = parse_identity(&identity)?;
            let case_inputs = parse_case_inputs(&inputs)?;
            let env = parse_env_overrides(&env)?;
            Ok(RunRequest::for_case(identity, case_inputs, env))
        }
        RunTarget::Suite { identity, node_inputs, env } => {
            let identity = parse_identity(&identity)?;
            let node_overrides = parse_node_inputs(&node_inputs)?;
            let env = parse_env_overrides(&env)?;
            Ok(RunRequest::for_suite(identity, node_overrides, env))
        }
        RunTarget::Plan { identity, env } => {
            let identity = parse_identity(&identity)?;
            let env = parse_env_overrides(&env)?;
            Ok(RunRequest::for_plan(identity, env))
        }
    }
}
