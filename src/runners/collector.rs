//! Order-preserving collection through a lazy sequence of deferred calls.
//!
//! [`OrderedCollector::descriptors`] yields one [`DeferredCall`] per id, in id
//! order, without starting any work. Each descriptor owns its id from the
//! moment it is constructed. Driving a descriptor performs the call and then
//! inserts the value into a shared [`ResultMap`] under a lock that is held for
//! the insert only. Once every descriptor has finished, the map is read back in
//! ascending id order regardless of the order calls completed in.

use std::iter::FusedIterator;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{CallError, Result};
use crate::models::{CallOutcome, CallResult, ResultMap, RunReport, Strategy};
use crate::operation::RemoteOperation;
use crate::source::WorkUnits;

use super::events::RunEvent;
use super::in_flight::InFlight;
use super::metrics::RunContext;
use super::{report_from_map, Runner};

/// Id-keyed results shared by every concurrently driven [`DeferredCall`].
pub type SharedResults = Arc<Mutex<ResultMap>>;

/// A constructed-but-not-yet-driven call for one id.
pub struct DeferredCall {
    id: usize,
    operation: Arc<dyn RemoteOperation>,
    sink: SharedResults,
}

impl DeferredCall {
    /// Bind `id` to a future call of `operation` that writes into `sink`.
    pub fn new(id: usize, operation: Arc<dyn RemoteOperation>, sink: SharedResults) -> Self {
        Self {
            id,
            operation,
            sink,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Perform the call and record its value under this descriptor's id.
    ///
    /// On failure nothing is written and the key stays absent.
    pub async fn drive(self) -> Result<CallResult> {
        let result = self.operation.call(self.id).await?;
        if result.id != self.id {
            return Err(CallError::operation(
                self.id,
                format!("operation answered for id {} instead", result.id),
            ));
        }

        self.sink.lock().await.insert(self.id, result.value.clone());
        Ok(result)
    }
}

/// Lazy, single-use sequence of [`DeferredCall`]s in id order.
pub struct DeferredCalls {
    units: WorkUnits,
    operation: Arc<dyn RemoteOperation>,
    sink: SharedResults,
}

impl Iterator for DeferredCalls {
    type Item = DeferredCall;

    fn next(&mut self) -> Option<DeferredCall> {
        let unit = self.units.next()?;
        Some(DeferredCall::new(
            unit.id,
            Arc::clone(&self.operation),
            Arc::clone(&self.sink),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.units.size_hint()
    }
}

impl ExactSizeIterator for DeferredCalls {}
impl FusedIterator for DeferredCalls {}

/// Drives every deferred call concurrently and reads the results back by id.
///
/// # Example
///
/// ```rust,ignore
/// let collector = OrderedCollector::new(RandomDelayService::new());
/// let report = collector.run(&RunConfig::new(18), &RunContext::new()).await?;
/// for (id, value) in report.values() {
///     print!("{id},{value};");
/// }
/// ```
pub struct OrderedCollector {
    operation: Arc<dyn RemoteOperation>,
}

impl OrderedCollector {
    pub fn new(operation: impl RemoteOperation + 'static) -> Self {
        Self {
            operation: Arc::new(operation),
        }
    }

    /// The deferred calls for ids `0..count`, writing into `sink` when driven.
    pub fn descriptors(&self, count: usize, sink: SharedResults) -> DeferredCalls {
        DeferredCalls {
            units: WorkUnits::new(count),
            operation: Arc::clone(&self.operation),
            sink,
        }
    }
}

#[async_trait]
impl Runner for OrderedCollector {
    fn strategy(&self, _config: &RunConfig) -> Strategy {
        Strategy::Ordered
    }

    async fn run(&self, config: &RunConfig, ctx: &RunContext) -> Result<RunReport> {
        let start = Instant::now();
        ctx.emit(RunEvent::RunStart {
            strategy: Strategy::Ordered.to_string(),
            call_count: config.call_count,
            ceiling: None,
        });
        info!(calls = config.call_count, "starting ordered run");

        let sink = SharedResults::default();
        let mut in_flight = InFlight::new();

        // Materialize the whole sequence before waiting on anything.
        for call in self.descriptors(config.call_count, Arc::clone(&sink)) {
            let id = call.id();
            in_flight.launch(id, call.drive());
            ctx.record_launch(id, in_flight.len());
        }
        let peak_in_flight = in_flight.len();

        let mut failures = Vec::new();
        while let Some(outcome) = in_flight.next_completed().await {
            ctx.record_harvest(&outcome, in_flight.len());
            match outcome {
                CallOutcome::Failed(failure) => {
                    warn!(id = failure.id, error = %failure.message, "deferred call failed");
                    failures.push(failure);
                }
                other => debug!(id = other.id(), "deferred call finished"),
            }
        }

        // Every writer has finished; the lock is uncontended from here on.
        let values = std::mem::take(&mut *sink.lock().await);
        let mut report = report_from_map(Strategy::Ordered, values, failures);
        debug_assert!(report.covers(config.call_count));
        report.peak_in_flight = peak_in_flight;
        report.elapsed = start.elapsed();

        ctx.emit(RunEvent::RunEnd {
            strategy: Strategy::Ordered.to_string(),
            elapsed_ms: report.elapsed.as_millis(),
            failures: report.failures().len(),
        });
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            failures = report.failures().len(),
            "ordered run finished"
        );

        Ok(report)
    }
}
