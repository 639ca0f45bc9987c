//! Structured trace events emitted while a run is in progress.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One thing that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunEvent {
    RunStart {
        strategy: String,
        call_count: usize,
        ceiling: Option<usize>,
    },
    /// A call was launched; `in_flight` includes it.
    Launched { id: usize, in_flight: usize },
    /// A finished call was harvested; `in_flight` counts the launched calls
    /// still unharvested at that moment, excluding this one.
    Harvested {
        id: usize,
        in_flight: usize,
        success: bool,
    },
    /// Launching stopped early; `remaining` ids will be reported as skipped.
    LaunchingStopped { remaining: usize },
    RunEnd {
        strategy: String,
        elapsed_ms: u128,
        failures: usize,
    },
}

/// A timestamped [`RunEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub event: RunEvent,
}

impl TraceEntry {
    pub fn new(event: RunEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}
