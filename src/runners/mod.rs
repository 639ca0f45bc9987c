//! Strategies for fanning a fixed set of ids out to a slow remote operation.
//!
//! # Strategies
//!
//! - **SequentialRunner**: one call at a time, the timing baseline
//! - **ParallelRunner**: every call at once, no ceiling
//! - **BatchScheduler**: at most `batch_size` calls in flight, refilled as calls finish
//! - **OrderedCollector**: a lazy sequence of deferred calls writing into a shared,
//!   id-keyed map that is read back in id order
//!
//! Every runner implements [`Runner`], takes a [`RunConfig`] and a
//! [`RunContext`], and returns a [`RunReport`] with one outcome per id.
//!
//! # Example
//!
//! ```rust,ignore
//! use call_strategies::runners::{BatchScheduler, Harness};
//! use call_strategies::{RandomDelayService, RunConfig};
//!
//! let harness = Harness::new(BatchScheduler::new(RandomDelayService::new())).with_name("batches");
//! let (report, metrics) = harness.run(&RunConfig::new(18).with_batch_size(4)).await?;
//! println!("{} calls in {:?}, peak {}", report.len(), report.elapsed, metrics.peak_in_flight);
//! ```

mod batch;
mod collector;
mod events;
mod in_flight;
mod instrumented;
mod metrics;
mod parallel;
mod sequential;

pub use batch::BatchScheduler;
pub use collector::{DeferredCall, DeferredCalls, OrderedCollector, SharedResults};
pub use events::{RunEvent, TraceEntry};
pub use instrumented::InstrumentedOperation;
pub use metrics::{RunContext, RunMetrics};
pub use parallel::ParallelRunner;
pub use sequential::{run_blocking, SequentialRunner};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunConfig;
use crate::error::{CallError, Result};
use crate::models::{CallOutcome, CallResult, OperationFailure, ResultMap, RunReport, Strategy};

/// A strategy for invoking the remote operation once per id in `0..call_count`.
#[async_trait]
pub trait Runner: Send + Sync {
    /// The strategy this runner implements under `config`.
    fn strategy(&self, config: &RunConfig) -> Strategy;

    /// Run every id once and report each outcome.
    ///
    /// Configuration errors are returned before any call is launched. Failed
    /// calls never fail the run; they are reported as [`CallOutcome::Failed`].
    async fn run(&self, config: &RunConfig, ctx: &RunContext) -> Result<RunReport>;
}

/// Turn the raw result of a call for `id` into its outcome.
///
/// The id is taken from the caller, never from the payload: a result that
/// answers for a different id is a failure of `id`.
pub(crate) fn outcome_for(id: usize, result: Result<CallResult>) -> CallOutcome {
    match result {
        Ok(result) if result.id == id => CallOutcome::Completed(result),
        Ok(result) => CallOutcome::Failed(OperationFailure::new(
            id,
            format!("operation answered for id {} instead", result.id),
        )),
        Err(CallError::Operation { message, .. }) => {
            CallOutcome::Failed(OperationFailure::new(id, message))
        }
        Err(other) => CallOutcome::Failed(OperationFailure::new(id, other.to_string())),
    }
}

/// Build an id-ordered report from a keyed result map and the failed ids.
pub(crate) fn report_from_map(
    strategy: Strategy,
    values: ResultMap,
    failures: Vec<OperationFailure>,
) -> RunReport {
    let mut report = RunReport::new(strategy);
    report.outcomes = values
        .into_iter()
        .map(|(id, value)| CallOutcome::Completed(CallResult { id, value }))
        .chain(failures.into_iter().map(CallOutcome::Failed))
        .collect();
    report.sort_by_id();
    report
}

/// Runs one strategy with a fresh context and structured logging.
///
/// The returned report is sorted by id so presentation is deterministic; use
/// the runner directly to observe completion order.
pub struct Harness {
    runner: Arc<dyn Runner>,
    name: Option<String>,
}

impl Harness {
    pub fn new(runner: impl Runner + 'static) -> Self {
        Self {
            runner: Arc::new(runner),
            name: None,
        }
    }

    /// Set a name for this run (used in logging).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Run and return the id-sorted report together with the run's metrics.
    pub async fn run(&self, config: &RunConfig) -> Result<(RunReport, RunMetrics)> {
        let ctx = RunContext::new();
        let report = self.run_with_context(config, &ctx).await?;
        Ok((report, ctx.snapshot()))
    }

    /// Run with a caller-supplied context, e.g. to aggregate metrics across runs.
    pub async fn run_with_context(
        &self,
        config: &RunConfig,
        ctx: &RunContext,
    ) -> Result<RunReport> {
        let strategy = self.runner.strategy(config);
        let name = self.name.clone().unwrap_or_else(|| strategy.to_string());
        tracing::info!(run = %name, calls = config.call_count, "starting run");

        match self.runner.run(config, ctx).await {
            Ok(mut report) => {
                report.sort_by_id();
                tracing::info!(
                    run = %name,
                    run_id = %report.run_id,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    failures = report.failures().len(),
                    skipped = report.skipped().len(),
                    "run completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(run = %name, "run rejected: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ScriptedOperation;

    #[test]
    fn test_outcome_for_uses_caller_id() {
        let outcome = outcome_for(3, Ok(CallResult::new(4, "v")));
        assert!(matches!(outcome, CallOutcome::Failed(ref f) if f.id == 3));

        let outcome = outcome_for(1, Err(CallError::operation(1, "down")));
        assert_eq!(
            outcome,
            CallOutcome::Failed(OperationFailure::new(1, "down"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_harness_sorts_report_and_collects_metrics() {
        let op = ScriptedOperation::new(vec![30, 20, 10]);
        let harness = Harness::new(ParallelRunner::new(op)).with_name("fan-out");

        let (report, metrics) = harness.run(&RunConfig::new(3)).await.unwrap();
        assert_eq!(report.ids(), vec![0, 1, 2]);
        assert_eq!(metrics.launched, 3);
        assert_eq!(metrics.succeeded, 3);
    }

    #[tokio::test]
    async fn test_harness_surfaces_configuration_errors() {
        let op = ScriptedOperation::uniform(2, 0);
        let harness = Harness::new(BatchScheduler::new(op));

        let err = harness
            .run(&RunConfig::new(2).with_batch_size(0))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
