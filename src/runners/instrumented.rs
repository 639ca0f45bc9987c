//! Concurrency instrumentation for remote operations.
//!
//! `InstrumentedOperation` wraps any operation and measures, from the
//! operation's side, how many invocations were live at the same time. This is
//! independent of what a runner believes its in-flight set holds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::error::Result;
use crate::models::CallResult;
use crate::operation::RemoteOperation;

#[derive(Debug, Default)]
struct Probe {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

/// Decrements the live count even if the call is dropped mid-flight.
struct ActiveGuard<'a>(&'a Probe);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps an operation and records live and peak concurrency of its calls.
///
/// Clones share the same counters, so keep one clone to inspect after handing
/// another to a runner.
///
/// # Example
///
/// ```rust,ignore
/// let probe = InstrumentedOperation::new(RandomDelayService::new(), "random-delay");
/// let scheduler = BatchScheduler::new(probe.clone());
/// scheduler.run(&RunConfig::new(18).with_batch_size(3), &RunContext::new()).await?;
/// assert!(probe.peak() <= 3);
/// ```
pub struct InstrumentedOperation<O> {
    inner: Arc<O>,
    name: String,
    probe: Arc<Probe>,
}

impl<O> Clone for InstrumentedOperation<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: self.name.clone(),
            probe: Arc::clone(&self.probe),
        }
    }
}

impl<O> InstrumentedOperation<O> {
    pub fn new(inner: O, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(inner),
            name: name.into(),
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls currently executing.
    pub fn active(&self) -> usize {
        self.probe.active.load(Ordering::SeqCst)
    }

    /// Largest number of calls ever executing at once.
    pub fn peak(&self) -> usize {
        self.probe.peak.load(Ordering::SeqCst)
    }

    /// Calls started so far.
    pub fn calls(&self) -> usize {
        self.probe.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<O> RemoteOperation for InstrumentedOperation<O>
where
    O: RemoteOperation + 'static,
{
    async fn call(&self, id: usize) -> Result<CallResult> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        let live = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(live, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.probe);

        let span = tracing::debug_span!("remote_call", operation = %self.name, id, live);
        self.inner.call(id).instrument(span).await
    }
}
