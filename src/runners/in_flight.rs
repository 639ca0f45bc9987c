//! Bookkeeping for launched-but-unharvested calls.
//!
//! Every call runs as its own task in a [`JoinSet`]. Completion is observed
//! through the task handle, and the handle's task id is the only thing used to
//! find the unit id a result belongs to. Each handle maps to exactly one id and
//! is removed on harvest, so a handle can never be harvested twice.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::task::{Id, JoinError, JoinSet};

use super::outcome_for;
use crate::error::Result;
use crate::models::{CallOutcome, CallResult, OperationFailure};
use crate::operation::RemoteOperation;

type Joined = std::result::Result<(Id, Result<CallResult>), JoinError>;

pub(crate) struct InFlight {
    tasks: JoinSet<Result<CallResult>>,
    ids: HashMap<Id, usize>,
    launched: HashSet<usize>,
    harvested: HashSet<usize>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            ids: HashMap::new(),
            launched: HashSet::new(),
            harvested: HashSet::new(),
        }
    }

    /// Launched calls whose handle has not been harvested yet, finished or not.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn `call` as the invocation for `id`.
    pub(crate) fn launch<F>(&mut self, id: usize, call: F)
    where
        F: Future<Output = Result<CallResult>> + Send + 'static,
    {
        let first_launch = self.launched.insert(id);
        debug_assert!(first_launch, "id {id} launched twice");
        let handle = self.tasks.spawn(call);
        self.ids.insert(handle.id(), id);
    }

    /// Spawn one call of `operation`, binding `id` into the task by value.
    pub(crate) fn launch_call(&mut self, operation: &Arc<dyn RemoteOperation>, id: usize) {
        let operation = Arc::clone(operation);
        self.launch(id, async move { operation.call(id).await });
    }

    /// Suspend until at least one call finishes and harvest it.
    ///
    /// Returns `None` without suspending when nothing is in flight.
    pub(crate) async fn next_completed(&mut self) -> Option<CallOutcome> {
        loop {
            let joined = self.tasks.join_next_with_id().await?;
            if let Some(outcome) = self.settle(joined) {
                return Some(outcome);
            }
        }
    }

    /// Harvest one call that has already finished, without suspending.
    pub(crate) fn try_completed(&mut self) -> Option<CallOutcome> {
        loop {
            let joined = self.tasks.try_join_next_with_id()?;
            if let Some(outcome) = self.settle(joined) {
                return Some(outcome);
            }
        }
    }

    /// Harvest every call that has already finished.
    pub(crate) fn drain_ready(&mut self) -> Vec<CallOutcome> {
        std::iter::from_fn(|| self.try_completed()).collect()
    }

    fn settle(&mut self, joined: Joined) -> Option<CallOutcome> {
        match joined {
            Ok((task, result)) => {
                let id = self.take(task)?;
                Some(outcome_for(id, result))
            }
            Err(err) => {
                let id = self.take(err.id())?;
                let message = if err.is_panic() {
                    "operation panicked"
                } else {
                    "operation was cancelled"
                };
                Some(CallOutcome::Failed(OperationFailure::new(id, message)))
            }
        }
    }

    /// Resolve a finished task to its unit id, removing the handle.
    fn take(&mut self, task: Id) -> Option<usize> {
        let Some(id) = self.ids.remove(&task) else {
            debug_assert!(false, "task {task} has no in-flight entry");
            tracing::error!(%task, "finished task has no in-flight entry, ignoring");
            return None;
        };
        let first_harvest = self.harvested.insert(id);
        debug_assert!(first_harvest, "id {id} harvested twice");
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::operation::ScriptedOperation;

    #[tokio::test(start_paused = true)]
    async fn test_harvests_in_completion_order() {
        let op: Arc<dyn RemoteOperation> = Arc::new(ScriptedOperation::new(vec![30, 10, 20]));
        let mut in_flight = InFlight::new();
        for id in 0..3 {
            in_flight.launch_call(&op, id);
        }
        assert_eq!(in_flight.len(), 3);

        let mut order = Vec::new();
        while let Some(outcome) = in_flight.next_completed().await {
            order.push(outcome.id());
        }
        assert_eq!(order, vec![1, 2, 0]);
        assert!(in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_ready_collects_ties() {
        let op: Arc<dyn RemoteOperation> = Arc::new(ScriptedOperation::new(vec![10, 10, 10, 40]));
        let mut in_flight = InFlight::new();
        for id in 0..4 {
            in_flight.launch_call(&op, id);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Let the finished tasks run to completion on the current-thread runtime.
        tokio::task::yield_now().await;

        let mut ready: Vec<usize> = in_flight.drain_ready().iter().map(CallOutcome::id).collect();
        ready.sort_unstable();
        assert_eq!(ready, vec![0, 1, 2]);
        assert_eq!(in_flight.len(), 1);
        assert!(in_flight.try_completed().is_none());
    }

    async fn exploding() -> Result<CallResult> {
        panic!("remote blew up")
    }

    #[tokio::test]
    async fn test_panicking_call_is_attributed_to_its_id() {
        let mut in_flight = InFlight::new();
        in_flight.launch(5, exploding());

        let outcome = in_flight.next_completed().await.unwrap();
        match outcome {
            CallOutcome::Failed(failure) => {
                assert_eq!(failure.id, 5);
                assert_eq!(failure.message, "operation panicked");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_result_id_is_a_failure() {
        let mut in_flight = InFlight::new();
        in_flight.launch(2, async { Ok::<_, crate::CallError>(CallResult::new(9, "wrong")) });

        let outcome = in_flight.next_completed().await.unwrap();
        assert!(matches!(outcome, CallOutcome::Failed(ref f) if f.id == 2));
    }

    #[cfg(debug_assertions)]
    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "launched twice")]
    async fn test_relaunching_a_harvested_id_is_caught() {
        let op: Arc<dyn RemoteOperation> = Arc::new(ScriptedOperation::uniform(2, 1));
        let mut in_flight = InFlight::new();
        in_flight.launch_call(&op, 1);
        in_flight.next_completed().await;
        in_flight.launch_call(&op, 1);
    }

    #[tokio::test]
    async fn test_empty_set_returns_immediately() {
        let mut in_flight = InFlight::new();
        assert!(in_flight.next_completed().await.is_none());
        assert!(in_flight.drain_ready().is_empty());
    }
}
