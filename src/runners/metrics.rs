//! Metrics and trace collection for runs.

use std::sync::Arc;

use parking_lot::Mutex;

use super::events::{RunEvent, TraceEntry};
use crate::models::CallOutcome;

/// Aggregated counters for one or more runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    /// Calls handed to the operation.
    pub launched: usize,
    /// Calls that returned a value for their own id.
    pub succeeded: usize,
    /// Calls that errored, panicked or answered for the wrong id.
    pub failed: usize,
    /// Ids never launched because launching stopped after a failure.
    pub skipped: usize,
    /// Largest in-flight set observed across runs.
    pub peak_in_flight: usize,
    /// Failure messages in harvest order.
    pub failures: Vec<String>,
}

impl RunMetrics {
    /// Count one launch made while `in_flight` calls were outstanding.
    pub fn record_launch(&mut self, in_flight: usize) {
        self.launched += 1;
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }

    /// Count a final outcome, keeping the message of failures.
    pub fn record_outcome(&mut self, outcome: &CallOutcome) {
        match outcome {
            CallOutcome::Completed(_) => self.succeeded += 1,
            CallOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures
                    .push(format!("id {}: {}", failure.id, failure.message));
            }
            CallOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Calls that reached a final outcome (including skipped ones).
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Context passed to every runner invocation.
///
/// Cloneable and thread-safe; clones share the same counters and trace log.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    metrics: Arc<Mutex<RunMetrics>>,
    traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl RunContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was launched, with `in_flight` counting it.
    pub fn record_launch(&self, id: usize, in_flight: usize) {
        self.metrics.lock().record_launch(in_flight);
        self.emit(RunEvent::Launched { id, in_flight });
    }

    /// Record a harvested outcome and the number of calls still unharvested.
    pub fn record_harvest(&self, outcome: &CallOutcome, in_flight: usize) {
        self.metrics.lock().record_outcome(outcome);
        self.emit(RunEvent::Harvested {
            id: outcome.id(),
            in_flight,
            success: outcome.is_success(),
        });
    }

    /// Record an outcome that did not pass through an in-flight set.
    pub fn record_outcome(&self, outcome: &CallOutcome) {
        self.metrics.lock().record_outcome(outcome);
    }

    /// Copy of the counters accumulated so far.
    pub fn snapshot(&self) -> RunMetrics {
        self.metrics.lock().clone()
    }

    /// Append a timestamped event to the trace.
    pub fn emit(&self, event: RunEvent) {
        self.traces.lock().push(TraceEntry::new(event));
    }

    /// Copy of the trace recorded so far.
    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.traces.lock().clone()
    }

    /// Ids in the order they were harvested.
    pub fn harvest_order(&self) -> Vec<usize> {
        self.traces
            .lock()
            .iter()
            .filter_map(|entry| match entry.event {
                RunEvent::Harvested { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids in the order they were launched.
    pub fn launch_order(&self) -> Vec<usize> {
        self.traces
            .lock()
            .iter()
            .filter_map(|entry| match entry.event {
                RunEvent::Launched { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn clear_traces(&self) {
        self.traces.lock().clear();
    }
}
