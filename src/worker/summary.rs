//! Result summaries reported back to the orchestrator.
//!
//! One [`ResultSummary`] per executed NodeGroup is the single event that
//! drives the scheduler's `handle_termination`. It folds per-node timing
//! measurements into one record so the orchestrator can account for an
//! application's work after it finishes.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::types::SerialNumber;

/// Whether a NodeGroup execution completed normally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryOutcome {
    Success,
    Failure,
}

/// Timing collected around one node's program run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeasurements {
    /// Wall-clock run time of the node's program, in milliseconds.
    pub real_time_ms: u64,
}

/// Execution summary of one dispatched NodeGroup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Owning application.
    pub application: String,
    /// Serial number the group was dispatched under.
    pub serial_number: SerialNumber,
    /// Overall outcome.
    pub outcome: SummaryOutcome,
    /// Wall-clock time of the whole group (wiring through join barrier).
    pub group_time_ms: u64,
    /// When the group finished on the worker.
    pub finished_at: DateTime<Utc>,
    /// Per-node measurements, keyed by node name.
    pub node_measurements: FxHashMap<String, NodeMeasurements>,
}

impl ResultSummary {
    /// A summary for a group that never got to run its nodes.
    #[must_use]
    pub fn failure(application: impl Into<String>, serial_number: SerialNumber) -> Self {
        Self {
            application: application.into(),
            serial_number,
            outcome: SummaryOutcome::Failure,
            group_time_ms: 0,
            finished_at: Utc::now(),
            node_measurements: FxHashMap::default(),
        }
    }

    /// Whether the group completed normally.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == SummaryOutcome::Success
    }
}
