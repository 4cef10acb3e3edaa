//! Reporter bus: an observer contract for planned/started/finished events,
//! delivered synchronously from the scheduler's thread of control
//! (SPEC_FULL.md §4.10 / spec.md §4.10, §5, §9).

use rigkit_runner::RunStatus;

/// One entry of the hierarchical plan exposed via `onRunPlanned`, tagged
/// with its parent so an observer can render a tree (spec.md §4.10).
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub node_id: String,
    pub label: String,
    pub parent_node_id: Option<String>,
}

/// Terminal state of one node, passed to `onNodeFinished`.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub node_id: String,
    pub status: RunStatus,
    pub retry_count: u32,
}

/// What kind of run a `runId` refers to, mirroring spec.md §3's `runType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Case,
    Suite,
    Plan,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Case => "case",
            Self::Suite => "suite",
            Self::Plan => "plan",
        };
        write!(f, "{s}")
    }
}

/// Observer contract for engine progress (spec.md §4.10).
///
/// Every method has a no-op default so implementers only override what they
/// need, mirroring the teacher's trait-with-defaults style for its
/// Phase/hook seams. Delivery is synchronous and from the scheduler's
/// thread of control: implementations must not block (spec.md §9 "reporter
/// back-pressure" — consumers needing to tail live output buffer and
/// throttle externally) and must not panic or unwind back into the
/// scheduler.
pub trait ReporterBus: Send + Sync {
    fn on_run_planned(&self, _run_id: &str, _run_type: RunType, _planned_nodes: &[PlannedNode]) {}
    fn on_node_started(&self, _run_id: &str, _node_id: &str) {}
    fn on_node_finished(&self, _run_id: &str, _node_state: &NodeState) {}
    fn on_run_finished(&self, _run_id: &str, _final_status: RunStatus) {}
}

/// Discards every event. The default reporter when no observer is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ReporterBus for NullReporter {}

/// Records every event it receives, in delivery order. Used by tests to
/// assert the ordering invariants in spec.md §5: `planned` precedes any
/// `nodeStarted`; for a given node, `started` precedes its `finished`;
/// `runFinished` is last.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    RunPlanned { run_id: String },
    NodeStarted { run_id: String, node_id: String },
    NodeFinished { run_id: String, node_id: String, status: String },
    RunFinished { run_id: String, status: String },
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("reporter mutex poisoned").clone()
    }
}

impl ReporterBus for RecordingReporter {
    fn on_run_planned(&self, run_id: &str, _run_type: RunType, _planned_nodes: &[PlannedNode]) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(RecordedEvent::RunPlanned { run_id: run_id.to_string() });
    }

    fn on_node_started(&self, run_id: &str, node_id: &str) {
        self.events.lock().expect("reporter mutex poisoned").push(RecordedEvent::NodeStarted {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
        });
    }

    fn on_node_finished(&self, run_id: &str, node_state: &NodeState) {
        self.events.lock().expect("reporter mutex poisoned").push(RecordedEvent::NodeFinished {
            run_id: run_id.to_string(),
            node_id: node_state.node_id.clone(),
            status: node_state.status.to_string(),
        });
    }

    fn on_run_finished(&self, run_id: &str, final_status: RunStatus) {
        self.events.lock().expect("reporter mutex poisoned").push(RecordedEvent::RunFinished {
            run_id: run_id.to_string(),
            status: final_status.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reporter_accepts_every_call_without_panicking() {
        let reporter = NullReporter;
        reporter.on_run_planned("r1", RunType::Case, &[]);
        reporter.on_node_started("r1", "n1");
        reporter.on_node_finished("r1", &NodeState { node_id: "n1".to_string(), status: RunStatus::Passed, retry_count: 0 });
        reporter.on_run_finished("r1", RunStatus::Passed);
    }

    #[test]
    fn recording_reporter_preserves_delivery_order() {
        let reporter = RecordingReporter::new();
        reporter.on_run_planned("r1", RunType::Case, &[]);
        reporter.on_node_started("r1", "n1");
        reporter.on_node_finished("r1", &NodeState { node_id: "n1".to_string(), status: RunStatus::Passed, retry_count: 0 });
        reporter.on_run_finished("r1", RunStatus::Passed);

        let events = reporter.events();
        assert_eq!(
            events,
            vec![
                RecordedEvent::RunPlanned { run_id: "r1".to_string() },
                RecordedEvent::NodeStarted { run_id: "r1".to_string(), node_id: "n1".to_string() },
                RecordedEvent::NodeFinished { run_id: "r1".to_string(), node_id: "n1".to_string(), status: "passed".to_string() },
                RecordedEvent::RunFinished { run_id: "r1".to_string(), status: "passed".to_string() },
            ]
        );
    }
}
