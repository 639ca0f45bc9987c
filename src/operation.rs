//! The remote operation every runner fans out to.
//!
//! The operation is a black box: given an id it returns `(id, value)` after an
//! unpredictable delay. It comes in two forms, [`RemoteOperation`] (async) and
//! [`BlockingOperation`]. [`Offloaded`] turns the blocking form into the async
//! one by running it on the runtime's blocking pool.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CallError, Result};
use crate::models::CallResult;

/// Suspend-capable form of the remote call.
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    /// Invoke the operation for one id.
    async fn call(&self, id: usize) -> Result<CallResult>;
}

/// Blocking form of the remote call. Occupies the calling thread until done.
pub trait BlockingOperation: Send + Sync {
    fn call_blocking(&self, id: usize) -> Result<CallResult>;
}

#[async_trait]
impl<T> RemoteOperation for Arc<T>
where
    T: RemoteOperation + ?Sized,
{
    async fn call(&self, id: usize) -> Result<CallResult> {
        (**self).call(id).await
    }
}

impl<T> BlockingOperation for Arc<T>
where
    T: BlockingOperation + ?Sized,
{
    fn call_blocking(&self, id: usize) -> Result<CallResult> {
        (**self).call_blocking(id)
    }
}

/// Convenience wrapper to turn an async function or closure into a [`RemoteOperation`].
///
/// # Example
///
/// ```rust,ignore
/// use call_strategies::{CallResult, LambdaOperation};
///
/// let echo = LambdaOperation(|id: usize| async move { Ok(CallResult::new(id, id.to_string())) });
/// ```
pub struct LambdaOperation<F>(pub F);

#[async_trait]
impl<F, Fut> RemoteOperation for LambdaOperation<F>
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CallResult>> + Send,
{
    async fn call(&self, id: usize) -> Result<CallResult> {
        (self.0)(id).await
    }
}

/// Runs a [`BlockingOperation`] on tokio's blocking pool so it can be awaited.
pub struct Offloaded<B> {
    inner: Arc<B>,
}

impl<B> Offloaded<B>
where
    B: BlockingOperation + 'static,
{
    pub fn new(inner: B) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B> Clone for Offloaded<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<B> RemoteOperation for Offloaded<B>
where
    B: BlockingOperation + 'static,
{
    async fn call(&self, id: usize) -> Result<CallResult> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.call_blocking(id))
            .await
            .map_err(|e| CallError::operation(id, format!("blocking call did not complete: {e}")))?
    }
}

/// Deterministic operation driven by a per-id latency table.
///
/// Each id sleeps `latencies[id] * unit` and returns the latency as its value.
/// Ids past the end of the table complete immediately. Ids marked as failing
/// sleep the same way and then return an error.
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    latencies: Vec<u64>,
    failing: HashSet<usize>,
    unit: Duration,
}

impl ScriptedOperation {
    pub fn new(latencies: impl Into<Vec<u64>>) -> Self {
        Self {
            latencies: latencies.into(),
            failing: HashSet::new(),
            unit: Duration::from_millis(1),
        }
    }

    /// Same latency for `count` ids.
    pub fn uniform(count: usize, latency: u64) -> Self {
        Self::new(vec![latency; count])
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn failing(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn latency_of(&self, id: usize) -> Duration {
        let ticks = self.latencies.get(id).copied().unwrap_or(0);
        self.unit * u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    fn finish(&self, id: usize) -> Result<CallResult> {
        if self.failing.contains(&id) {
            return Err(CallError::operation(id, "injected failure"));
        }
        let ticks = self.latencies.get(id).copied().unwrap_or(0);
        Ok(CallResult::new(id, ticks.to_string()))
    }
}

#[async_trait]
impl RemoteOperation for ScriptedOperation {
    async fn call(&self, id: usize) -> Result<CallResult> {
        tokio::time::sleep(self.latency_of(id)).await;
        self.finish(id)
    }
}

impl BlockingOperation for ScriptedOperation {
    fn call_blocking(&self, id: usize) -> Result<CallResult> {
        std::thread::sleep(self.latency_of(id));
        self.finish(id)
    }
}
