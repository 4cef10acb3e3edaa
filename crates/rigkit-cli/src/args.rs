//! Command-line argument definitions (SPEC_FULL.md §6, spec.md §6.4).
//!
//! `rigkit` parses its own invocation into the same three-way shape as
//! [`rigkit_engine::RunRequest`]: exactly one of `case`, `suite`, or `plan`,
//! plus `--input`/`--node-input`/`--env` overrides. Clap's `ArgGroup`
//! enforces the mutual exclusion at parse time, before any of it reaches the
//! engine's own type-level enforcement.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// rigkit - on-device test case, suite, and plan execution engine.
#[derive(Parser)]
#[command(name = "rigkit")]
#[command(about = "Runs a test case, suite, or plan and reports its terminal status")]
#[command(long_about = r#"
rigkit discovers test cases, suites, and plans from a catalog of manifest
files, resolves one run's inputs and environment, hands each case off to a
configured runner process, and reports the aggregate terminal status.

EXAMPLES:
  # Run a single case
  rigkit run case CpuStress@1.0.0

  # Run a suite, overriding one node's input
  rigkit run suite Smoke@2.1.0 --node-input boot-check.retries=3

  # Run a plan (no input overrides are permitted)
  rigkit run plan NightlyRegression@1.0.0

  # Override an environment variable for the run
  rigkit run case CpuStress@1.0.0 --env TARGET_HOST=10.0.0.5

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > RIGKIT_* environment
  variables > rigkit.toml (searched at --config, default ./rigkit.toml) >
  built-in defaults.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to rigkit.toml (defaults to ./rigkit.toml; missing file is not an error)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Root directory to scan for test case manifests
    #[arg(long, global = true)]
    pub cases_root: Option<Utf8PathBuf>,

    /// Root directory to scan for suite manifests
    #[arg(long, global = true)]
    pub suites_root: Option<Utf8PathBuf>,

    /// Root directory to scan for plan manifests
    #[arg(long, global = true)]
    pub plans_root: Option<Utf8PathBuf>,

    /// Root directory runs are written under
    #[arg(long, global = true)]
    pub runs_root: Option<Utf8PathBuf>,

    /// Default case timeout in seconds, used when a case manifest omits one
    #[arg(long, global = true)]
    pub default_timeout_sec: Option<u64>,

    /// Executable invoked to run each case (reads the invocation document on stdin)
    #[arg(long, global = true)]
    pub runner: Option<String>,

    /// Enable debug-level log output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a case, suite, or plan to a terminal status
    Run {
        #[command(subcommand)]
        target: RunTarget,
    },

    /// Scan the configured roots and list discovered identities
    Discover,
}

#[derive(Subcommand)]
pub enum RunTarget {
    /// Run a single test case
    Case {
        /// Case identity, `id@version`
        identity: String,

        /// Input override `key=jsonValue`, repeatable
        #[arg(long = "input", value_name = "KEY=JSON")]
        inputs: Vec<String>,

        /// Environment override `NAME=value`, repeatable
        #[arg(long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },

    /// Run a suite of cases
    Suite {
        /// Suite identity, `id@version`
        identity: String,

        /// Per-node input override `nodeId.key=jsonValue`, repeatable
        #[arg(long = "node-input", value_name = "NODE.KEY=JSON")]
        node_inputs: Vec<String>,

        /// Environment override `NAME=value`, repeatable
        #[arg(long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },

    /// Run a plan (no input overrides are permitted)
    Plan {
        /// Plan identity, `id@version`
        identity: String,

        /// Environment override `NAME=value`, repeatable
        #[arg(long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
    },
}
