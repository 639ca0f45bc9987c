//! Bounded-concurrency scheduling.
//!
//! `BatchScheduler` keeps at most `batch_size` calls in flight. Whenever the
//! set is full (or no ids are left to launch) it waits for one call to finish,
//! harvests that call together with every other call that has finished in the
//! meantime, then refills the set from the remaining ids.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FailurePolicy, RunConfig};
use crate::error::Result;
use crate::models::{CallOutcome, RunReport, Strategy};
use crate::operation::RemoteOperation;
use crate::source::WorkUnits;

use super::events::RunEvent;
use super::in_flight::InFlight;
use super::metrics::RunContext;
use super::Runner;

/// Runs every id while never letting more than `batch_size` calls overlap.
///
/// With `batch_size >= call_count` this behaves like [`super::ParallelRunner`];
/// with `batch_size == 1` calls are strictly serialized but still go through
/// the async path.
///
/// # Example
///
/// ```rust,ignore
/// use call_strategies::runners::{BatchScheduler, RunContext, Runner};
/// use call_strategies::{RandomDelayService, RunConfig};
///
/// let scheduler = BatchScheduler::new(RandomDelayService::new());
/// let ctx = RunContext::new();
/// let report = scheduler.run(&RunConfig::new(18).with_batch_size(5), &ctx).await?;
/// assert!(report.peak_in_flight <= 5);
/// ```
pub struct BatchScheduler {
    operation: Arc<dyn RemoteOperation>,
}

impl BatchScheduler {
    pub fn new(operation: impl RemoteOperation + 'static) -> Self {
        Self {
            operation: Arc::new(operation),
        }
    }

    /// Fill the in-flight set up to `ceiling` from `units`.
    fn fill(
        &self,
        units: &mut WorkUnits,
        in_flight: &mut InFlight,
        ceiling: usize,
        ctx: &RunContext,
        report: &mut RunReport,
    ) {
        while in_flight.len() < ceiling {
            let Some(unit) = units.next() else {
                break;
            };
            in_flight.launch_call(&self.operation, unit.id);

            let size = in_flight.len();
            debug_assert!(size <= ceiling, "in-flight set exceeded its ceiling");
            report.peak_in_flight = report.peak_in_flight.max(size);
            ctx.record_launch(unit.id, size);
            debug!(id = unit.id, in_flight = size, "launched call");
        }
    }
}

#[async_trait]
impl Runner for BatchScheduler {
    fn strategy(&self, config: &RunConfig) -> Strategy {
        Strategy::Batched {
            ceiling: config.batch_size,
        }
    }

    async fn run(&self, config: &RunConfig, ctx: &RunContext) -> Result<RunReport> {
        config.validate()?;

        let strategy = self.strategy(config);
        let ceiling = config.batch_size;
        let start = Instant::now();
        let mut report = RunReport::new(strategy);

        ctx.emit(RunEvent::RunStart {
            strategy: strategy.to_string(),
            call_count: config.call_count,
            ceiling: Some(ceiling),
        });
        info!(calls = config.call_count, ceiling, "starting batched run");

        let mut units = WorkUnits::new(config.call_count);
        let mut in_flight = InFlight::new();
        let mut launching = true;

        loop {
            if launching {
                self.fill(&mut units, &mut in_flight, ceiling, ctx, &mut report);
            }

            // Wait for at least one call; `None` means nothing is left in flight.
            let Some(first) = in_flight.next_completed().await else {
                break;
            };

            // Several calls may have finished while we were suspended.
            let mut ready = vec![first];
            ready.extend(in_flight.drain_ready());

            let mut unharvested = in_flight.len() + ready.len();
            for outcome in ready {
                unharvested -= 1;
                if let CallOutcome::Failed(failure) = &outcome {
                    warn!(id = failure.id, error = %failure.message, "call failed");
                    if launching && config.failure_policy == FailurePolicy::StopLaunching {
                        launching = false;
                        ctx.emit(RunEvent::LaunchingStopped {
                            remaining: units.remaining(),
                        });
                        info!(
                            remaining = units.remaining(),
                            in_flight = unharvested,
                            "stopped launching after failure, draining"
                        );
                    }
                }
                ctx.record_harvest(&outcome, unharvested);
                debug!(id = outcome.id(), in_flight = unharvested, "harvested call");
                report.outcomes.push(outcome);
            }
        }

        debug_assert!(in_flight.is_empty());
        for unit in units {
            let outcome = CallOutcome::Skipped { id: unit.id };
            ctx.record_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        debug_assert!(report.covers(config.call_count));
        report.elapsed = start.elapsed();

        let failures = report.failures().len();
        ctx.emit(RunEvent::RunEnd {
            strategy: strategy.to_string(),
            elapsed_ms: report.elapsed.as_millis(),
            failures,
        });
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            failures,
            peak_in_flight = report.peak_in_flight,
            "batched run finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ScriptedOperation;

    #[tokio::test]
    async fn test_zero_calls_returns_empty_report() {
        let scheduler = BatchScheduler::new(ScriptedOperation::new(Vec::new()));
        let ctx = RunContext::new();

        let report = scheduler
            .run(&RunConfig::new(0).with_batch_size(3), &ctx)
            .await
            .unwrap();

        assert!(report.is_empty());
        assert_eq!(report.peak_in_flight, 0);
        assert_eq!(ctx.snapshot().launched, 0);
    }

    #[tokio::test]
    async fn test_zero_ceiling_rejected_before_launch() {
        let scheduler = BatchScheduler::new(ScriptedOperation::uniform(4, 0));
        let ctx = RunContext::new();

        let err = scheduler
            .run(&RunConfig::new(4).with_batch_size(0), &ctx)
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(ctx.trace_snapshot().is_empty());
        assert_eq!(ctx.snapshot().launched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_launch_respects_ceiling() {
        let latencies: Vec<u64> = (0..20).map(|i| (i * 7 % 13) + 1).collect();
        let scheduler = BatchScheduler::new(ScriptedOperation::new(latencies));
        let ctx = RunContext::new();

        let report = scheduler
            .run(&RunConfig::new(20).with_batch_size(3), &ctx)
            .await
            .unwrap();

        assert!(report.covers(20));
        assert_eq!(report.peak_in_flight, 3);
        for entry in ctx.trace_snapshot() {
            if let RunEvent::Launched { in_flight, .. } = entry.event {
                assert!(in_flight <= 3, "launched with {in_flight} in flight");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tied_completions_are_harvested_before_refill() {
        let scheduler = BatchScheduler::new(ScriptedOperation::uniform(7, 10));
        let ctx = RunContext::new();

        let report = scheduler
            .run(&RunConfig::new(7).with_batch_size(3), &ctx)
            .await
            .unwrap();
        assert!(report.covers(7));

        let timeline: Vec<RunEvent> = ctx
            .trace_snapshot()
            .into_iter()
            .map(|entry| entry.event)
            .filter(|event| {
                matches!(event, RunEvent::Launched { .. } | RunEvent::Harvested { .. })
            })
            .collect();

        let launched = |id, in_flight| RunEvent::Launched { id, in_flight };
        assert_eq!(timeline[..3], [launched(0, 1), launched(1, 2), launched(2, 3)]);

        // The three tied calls are all harvested before the set is refilled.
        let mut tied = Vec::new();
        for (event, expected_in_flight) in timeline[3..6].iter().zip([2, 1, 0]) {
            match *event {
                RunEvent::Harvested { id, in_flight, success } => {
                    assert!(success);
                    assert_eq!(in_flight, expected_in_flight);
                    tied.push(id);
                }
                ref other => panic!("expected a harvest, got {other:?}"),
            }
        }
        tied.sort_unstable();
        assert_eq!(tied, vec![0, 1, 2]);

        assert_eq!(timeline[6..9], [launched(3, 1), launched(4, 2), launched(5, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_policy_reports_all_failures() {
        let op = ScriptedOperation::uniform(6, 5).failing([1, 4]);
        let scheduler = BatchScheduler::new(op);
        let ctx = RunContext::new();

        let mut report = scheduler
            .run(&RunConfig::new(6).with_batch_size(2), &ctx)
            .await
            .unwrap();
        report.sort_by_id();

        assert!(report.covers(6));
        let failed: Vec<usize> = report.failures().iter().map(|f| f.id).collect();
        assert_eq!(failed, vec![1, 4]);
        assert!(report.skipped().is_empty());
        assert_eq!(ctx.snapshot().launched, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_policy_drains_in_flight_and_skips_rest() {
        // id 0 fails at t=5 while id 1 is still running until t=50.
        let op = ScriptedOperation::new(vec![5, 50, 5, 5, 5]).failing([0]);
        let scheduler = BatchScheduler::new(op);
        let ctx = RunContext::new();
        let config = RunConfig::new(5)
            .with_batch_size(2)
            .with_failure_policy(FailurePolicy::StopLaunching);

        let mut report = scheduler.run(&config, &ctx).await.unwrap();
        report.sort_by_id();

        assert!(report.covers(5));
        assert_eq!(report.outcomes[1].value(), Some("50"));
        assert_eq!(report.skipped(), vec![2, 3, 4]);
        assert_eq!(ctx.snapshot().launched, 2);
        assert!(ctx
            .trace_snapshot()
            .iter()
            .any(|entry| entry.event == RunEvent::LaunchingStopped { remaining: 3 }));
    }
}
