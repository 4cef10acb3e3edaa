//! Engine facade: wires discovery (C2), reference resolution (C3), typed
//! inputs (C6), the scheduler (C8), artifacts (C9), the reporter bus (C10),
//! and the privilege gate (C11) into one `RunRequest` entry point
//! (SPEC_FULL.md §6, spec.md §6.4).

pub mod error;
pub mod request;

use std::cell::RefCell;
use std::collections::BTreeMap;

use rigkit_catalog::{discover, Catalog, DiscoveryReport};
use rigkit_manifest::{Identity, RawInput};
use rigkit_config::{ElevationOverride, EngineConfig};
use rigkit_privilege::{ElevationProbe, HostElevationProbe};
use rigkit_redact::SecretRedactor;
use rigkit_report::ReporterBus;
use rigkit_runner::{CaseRunner, RunStatus, RunnerCommandFactory};
use rigkit_scheduler::{case, plan, suite, SchedulerContext};
use rigkit_utils::CancellationToken;

pub use error::EngineError;
pub use request::RunRequest;
use request::RunTarget;

/// Terminal outcome of one `RunRequest`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
}

/// Resolves [`ElevationOverride`] to a concrete [`ElevationProbe`], so tests
/// and CI containers can force an answer instead of depending on the host's
/// real privilege level.
struct ConfiguredElevationProbe {
    override_mode: ElevationOverride,
    host: HostElevationProbe,
}

impl ElevationProbe for ConfiguredElevationProbe {
    fn is_elevated(&self) -> bool {
        match self.override_mode {
            ElevationOverride::Probe => self.host.is_elevated(),
            ElevationOverride::ForceElevated => true,
            ElevationOverride::ForceNotElevated => false,
        }
    }
}

/// The engine kernel: an immutable catalog plus the dependencies needed to
/// drive one case, suite, or plan to a terminal status.
pub struct Engine {
    catalog: Catalog,
    runs_root: camino::Utf8PathBuf,
    engine_version: String,
    default_timeout_sec: u64,
    runner: Box<dyn CaseRunner>,
    command_factory: Box<dyn RunnerCommandFactory>,
    elevation_probe: ConfiguredElevationProbe,
    reporter: Box<dyn ReporterBus>,
    cancel: CancellationToken,
    redactor: RefCell<SecretRedactor>,
}

impl Engine {
    /// Scan `config`'s three discovery roots and build the immutable
    /// catalog this engine will serve `RunRequest`s against. Discovery
    /// errors (duplicate identities, parse failures) are returned alongside
    /// the catalog rather than failing the whole scan (spec.md §4.2); a
    /// caller that wants to surface them can inspect the report before
    /// calling [`Engine::new`].
    pub fn discover(config: &EngineConfig) -> Result<DiscoveryReport, EngineError> {
        Ok(discover(&config.cases_root, &config.suites_root, &config.plans_root)?)
    }

    /// Build an engine from a discovery report plus its runtime
    /// collaborators. Taking the report (not just the config) lets a caller
    /// inspect discovery errors before committing to running anything.
    pub fn new(
        config: &EngineConfig,
        catalog: Catalog,
        engine_version: impl Into<String>,
        runner: Box<dyn CaseRunner>,
        command_factory: Box<dyn RunnerCommandFactory>,
        reporter: Box<dyn ReporterBus>,
    ) -> Self {
        Self {
            catalog,
            runs_root: config.runs_root.clone(),
            engine_version: engine_version.into(),
            default_timeout_sec: config.default_timeout_sec,
            runner,
            command_factory,
            elevation_probe: ConfiguredElevationProbe {
                override_mode: config.elevation_override,
                host: HostElevationProbe,
            },
            reporter,
            cancel: CancellationToken::new(),
            redactor: RefCell::new(SecretRedactor::new()),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// A clone of this engine's cancellation token. Clones share the same
    /// underlying flag; calling `.cancel()` on any clone stops the
    /// in-progress [`Engine::run`] cooperatively (spec.md §4.8).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn scheduler_ctx(&self) -> SchedulerContext<'_> {
        SchedulerContext {
            catalog: &self.catalog,
            runs_root: self.runs_root.as_path(),
            engine_version: &self.engine_version,
            runner: self.runner.as_ref(),
            command_factory: self.command_factory.as_ref(),
            elevation_probe: &self.elevation_probe,
            reporter: self.reporter.as_ref(),
            cancel: &self.cancel,
            redactor: &self.redactor,
            default_timeout_sec: self.default_timeout_sec,
        }
    }

    /// Run one `RunRequest` to a terminal aggregate status.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome, EngineError> {
        let ctx = self.scheduler_ctx();
        match &request.target {
            RunTarget::Case { identity, case_inputs } => self.run_case(&ctx, identity, case_inputs.as_ref(), request),
            RunTarget::Suite { identity, node_overrides } => {
                self.run_suite(&ctx, identity, node_overrides.as_ref(), request)
            }
            RunTarget::Plan { identity } => self.run_plan(&ctx, identity, request),
        }
    }

    fn run_case(
        &self,
        ctx: &SchedulerContext<'_>,
        identity: &Identity,
        case_inputs: Option<&BTreeMap<String, RawInput>>,
        request: &RunRequest,
    ) -> Result<RunOutcome, EngineError> {
        let mut env = rigkit_env::EffectiveEnv::new();
        env.apply_layer(rigkit_env::EnvLayer::Os, rigkit_env::os_snapshot())
            .map_err(|e| EngineError::Scheduler(rigkit_scheduler::SchedulerError::Env(e)))?;
        if let Some(overrides) = &request.environment_overrides {
            env.apply_layer(rigkit_env::EnvLayer::Override, overrides.clone())
                .map_err(|e| EngineError::Scheduler(rigkit_scheduler::SchedulerError::Env(e)))?;
        }

        let prepared = case::prepare_case(
            ctx.catalog,
            identity,
            &identity.to_string(),
            None,
            case_inputs,
            &env,
            ctx.default_timeout_sec,
            ctx.elevation_probe,
            ctx.redactor,
        )?;

        let case_ctx = ctx.case_ctx();
        let outcome = case::execute_case_with_retry(&case_ctx, &prepared, None, &env, 0)?;
        Ok(RunOutcome { run_id: outcome.run_id, status: outcome.status })
    }

    fn run_suite(
        &self,
        ctx: &SchedulerContext<'_>,
        identity: &Identity,
        node_overrides: Option<&BTreeMap<String, BTreeMap<String, RawInput>>>,
        request: &RunRequest,
    ) -> Result<RunOutcome, EngineError> {
        let outcome = suite::execute_suite(
            ctx,
            identity,
            &identity.to_string(),
            None,
            None,
            node_overrides,
            request.environment_overrides.as_ref(),
        )?;
        Ok(RunOutcome { run_id: outcome.run_id, status: outcome.status })
    }

    fn run_plan(
        &self,
        ctx: &SchedulerContext<'_>,
        identity: &Identity,
        request: &RunRequest,
    ) -> Result<RunOutcome, EngineError> {
        let outcome = plan::execute_plan(ctx, identity, request.environment_overrides.as_ref())?;
        Ok(RunOutcome { run_id: outcome.run_id, status: outcome.status })
    }
}

/// Reject a CLI-level attempt to combine `--plan` with input overrides
/// before they ever reach [`RunRequest`]'s type-enforced constructors
/// (spec.md §6.4, `Plan.InputOverride.NotAllowed`).
pub fn reject_plan_input_overrides(has_overrides: bool) -> Result<(), EngineError> {
    if has_overrides {
        return Err(EngineError::PlanInputOverrideNotAllowed);
    }
    Ok(())
}
