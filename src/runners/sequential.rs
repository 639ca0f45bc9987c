//! One call at a time. Used as the timing baseline for the other strategies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::Result;
use crate::models::{CallOutcome, OperationFailure, ResultMap, RunReport, Strategy};
use crate::operation::{BlockingOperation, RemoteOperation};
use crate::source::WorkUnits;

use super::events::RunEvent;
use super::metrics::RunContext;
use super::{outcome_for, report_from_map, Runner};

/// Awaits each call before starting the next.
pub struct SequentialRunner {
    operation: Arc<dyn RemoteOperation>,
}

impl SequentialRunner {
    pub fn new(operation: impl RemoteOperation + 'static) -> Self {
        Self {
            operation: Arc::new(operation),
        }
    }
}

#[async_trait]
impl Runner for SequentialRunner {
    fn strategy(&self, _config: &RunConfig) -> Strategy {
        Strategy::Sequential
    }

    async fn run(&self, config: &RunConfig, ctx: &RunContext) -> Result<RunReport> {
        let start = Instant::now();
        ctx.emit(RunEvent::RunStart {
            strategy: Strategy::Sequential.to_string(),
            call_count: config.call_count,
            ceiling: Some(1),
        });
        info!(calls = config.call_count, "starting sequential run");

        let mut values = ResultMap::new();
        let mut failures = Vec::new();
        for unit in WorkUnits::new(config.call_count) {
            ctx.record_launch(unit.id, 1);
            let outcome = outcome_for(unit.id, self.operation.call(unit.id).await);
            ctx.record_harvest(&outcome, 0);
            accumulate(&mut values, &mut failures, outcome);
        }

        let mut report = report_from_map(Strategy::Sequential, values, failures);
        report.peak_in_flight = usize::from(config.call_count > 0);
        report.elapsed = start.elapsed();
        ctx.emit(RunEvent::RunEnd {
            strategy: Strategy::Sequential.to_string(),
            elapsed_ms: report.elapsed.as_millis(),
            failures: report.failures().len(),
        });
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            "sequential run finished"
        );
        Ok(report)
    }
}

/// Call a blocking operation for each id in order on the current thread.
///
/// Do not call this from inside an async task; it blocks for the sum of all
/// latencies.
pub fn run_blocking(operation: &dyn BlockingOperation, call_count: usize) -> RunReport {
    let start = std::time::Instant::now();
    let mut values = ResultMap::new();
    let mut failures = Vec::new();

    for unit in WorkUnits::new(call_count) {
        let outcome = outcome_for(unit.id, operation.call_blocking(unit.id));
        accumulate(&mut values, &mut failures, outcome);
    }

    let mut report = report_from_map(Strategy::Sequential, values, failures);
    report.peak_in_flight = usize::from(call_count > 0);
    report.elapsed = start.elapsed();
    info!(
        calls = call_count,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "blocking sequential run finished"
    );
    report
}

fn accumulate(values: &mut ResultMap, failures: &mut Vec<OperationFailure>, outcome: CallOutcome) {
    match outcome {
        CallOutcome::Completed(result) => {
            debug!(id = result.id, "call finished");
            values.insert(result.id, result.value);
        }
        CallOutcome::Failed(failure) => {
            warn!(id = failure.id, error = %failure.message, "call failed");
            failures.push(failure);
        }
        CallOutcome::Skipped { .. } => {}
    }
}
