//! A [`ReporterBus`] that logs progress via `tracing`, the CLI's own
//! observer (SPEC_FULL.md §4.10). Library crates stay silent by default
//! (`NullReporter`); only the binary front-end decides progress is worth
//! printing.

use rigkit_report::{NodeState, PlannedNode, ReporterBus, RunType};
use rigkit_runner::RunStatus;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ReporterBus for TracingReporter {
    fn on_run_planned(&self, run_id: &str, run_type: RunType, planned_nodes: &[PlannedNode]) {
        tracing::info!(run_id, %run_type, node_count = planned_nodes.len(), "run planned");
    }

    fn on_node_started(&self, run_id: &str, node_id: &str) {
        tracing::info!(run_id, node_id, "node started");
    }

    fn on_node_finished(&self, run_id: &str, node_state: &NodeState) {
        tracing::info!(
            run_id,
            node_id = %node_state.node_id,
            status = %node_state.status,
            retry_count = node_state.retry_count,
            "node finished"
        );
    }

    fn on_run_finished(&self, run_id: &str, final_status: RunStatus) {
        tracing::info!(run_id, status = %final_status, "run finished");
    }
}
