//! Unbounded fan-out.
//!
//! `ParallelRunner` launches every call at once and waits for all of them.
//! Failures never cut the run short: every call is given the chance to finish,
//! and [`RunReport::into_result`] surfaces the aggregate afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::Result;
use crate::models::{CallOutcome, RunReport, Strategy};
use crate::operation::RemoteOperation;
use crate::source::WorkUnits;

use super::events::RunEvent;
use super::in_flight::InFlight;
use super::metrics::RunContext;
use super::Runner;

/// Launch all calls concurrently with no ceiling.
///
/// # Example
///
/// ```rust,ignore
/// let runner = ParallelRunner::new(RandomDelayService::new());
/// let report = runner.run(&RunConfig::new(18), &RunContext::new()).await?;
/// let values = report.into_result()?; // fails if any call failed
/// ```
pub struct ParallelRunner {
    operation: Arc<dyn RemoteOperation>,
}

impl ParallelRunner {
    pub fn new(operation: impl RemoteOperation + 'static) -> Self {
        Self {
            operation: Arc::new(operation),
        }
    }
}

#[async_trait]
impl Runner for ParallelRunner {
    fn strategy(&self, _config: &RunConfig) -> Strategy {
        Strategy::Parallel
    }

    async fn run(&self, config: &RunConfig, ctx: &RunContext) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new(Strategy::Parallel);

        ctx.emit(RunEvent::RunStart {
            strategy: Strategy::Parallel.to_string(),
            call_count: config.call_count,
            ceiling: None,
        });
        info!(calls = config.call_count, "starting parallel run");

        let mut in_flight = InFlight::new();
        for unit in WorkUnits::new(config.call_count) {
            in_flight.launch_call(&self.operation, unit.id);
            ctx.record_launch(unit.id, in_flight.len());
        }
        report.peak_in_flight = in_flight.len();

        while let Some(outcome) = in_flight.next_completed().await {
            if let CallOutcome::Failed(failure) = &outcome {
                warn!(id = failure.id, error = %failure.message, "call failed");
            }
            ctx.record_harvest(&outcome, in_flight.len());
            debug!(id = outcome.id(), remaining = in_flight.len(), "call finished");
            report.outcomes.push(outcome);
        }

        report.elapsed = start.elapsed();
        let failures = report.failures().len();
        ctx.emit(RunEvent::RunEnd {
            strategy: Strategy::Parallel.to_string(),
            elapsed_ms: report.elapsed.as_millis(),
            failures,
        });
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            failures,
            "parallel run finished"
        );

        Ok(report)
    }
}
