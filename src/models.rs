use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CallError, Result};

/// Results keyed by id. Iteration is always in ascending id order.
pub type ResultMap = BTreeMap<usize, String>;

/// A single unit of work: one invocation of the remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: usize,
}

impl WorkUnit {
    pub fn new(id: usize) -> Self {
        Self { id }
    }
}

/// The value produced by one successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub id: usize,
    pub value: String,
}

impl CallResult {
    pub fn new(id: usize, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// A call that finished with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub id: usize,
    pub message: String,
}

impl OperationFailure {
    pub fn new(id: usize, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

impl From<OperationFailure> for CallError {
    fn from(failure: OperationFailure) -> Self {
        CallError::Operation {
            id: failure.id,
            message: failure.message,
        }
    }
}

/// Final state of one id after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CallOutcome {
    Completed(CallResult),
    Failed(OperationFailure),
    /// Never launched because the run stopped launching after a failure.
    Skipped { id: usize },
}

impl CallOutcome {
    pub fn id(&self) -> usize {
        match self {
            Self::Completed(result) => result.id,
            Self::Failed(failure) => failure.id,
            Self::Skipped { id } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Completed(result) => Some(&result.value),
            _ => None,
        }
    }
}

/// Which strategy produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    Sequential,
    Parallel,
    Batched { ceiling: usize },
    Ordered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Batched { ceiling } => write!(f, "batched(ceiling={ceiling})"),
            Self::Ordered => write!(f, "ordered"),
        }
    }
}

/// Everything a runner produced for one invocation.
///
/// `outcomes` holds one entry per id. Runners that harvest by completion
/// keep completion order; use [`RunReport::sort_by_id`] for a deterministic view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this invocation.
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub outcomes: Vec<CallOutcome>,
    pub elapsed: Duration,
    /// Largest number of calls in flight at once, as seen by the runner.
    pub peak_in_flight: usize,
}

impl RunReport {
    /// Create an empty report with a fresh run id.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            outcomes: Vec::new(),
            elapsed: Duration::ZERO,
            peak_in_flight: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Ids in the order their outcomes were recorded.
    pub fn ids(&self) -> Vec<usize> {
        self.outcomes.iter().map(CallOutcome::id).collect()
    }

    /// Reorder outcomes by ascending id.
    pub fn sort_by_id(&mut self) {
        self.outcomes.sort_by_key(CallOutcome::id);
    }

    /// Successful values keyed by id.
    pub fn values(&self) -> ResultMap {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                CallOutcome::Completed(result) => Some((result.id, result.value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<&OperationFailure> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                CallOutcome::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                CallOutcome::Skipped { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// True when every id in `0..count` has exactly one outcome.
    pub fn covers(&self, count: usize) -> bool {
        if self.outcomes.len() != count {
            return false;
        }
        let mut seen = vec![false; count];
        for outcome in &self.outcomes {
            match seen.get_mut(outcome.id()) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    /// Convert into the successful values, or an aggregate error listing every
    /// failed or skipped id.
    pub fn into_result(self) -> Result<ResultMap> {
        let total = self.outcomes.len();
        let mut values = ResultMap::new();
        let mut failures = Vec::new();

        for outcome in self.outcomes {
            match outcome {
                CallOutcome::Completed(result) => {
                    values.insert(result.id, result.value);
                }
                CallOutcome::Failed(failure) => failures.push(failure),
                CallOutcome::Skipped { id } => {
                    failures.push(OperationFailure::new(id, "skipped after an earlier failure"))
                }
            }
        }

        if failures.is_empty() {
            Ok(values)
        } else {
            failures.sort_by_key(|f| f.id);
            Err(CallError::Aggregate {
                failed: failures.len(),
                total,
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<CallOutcome>) -> RunReport {
        let mut report = RunReport::new(Strategy::Parallel);
        report.outcomes = outcomes;
        report
    }

    #[test]
    fn test_covers_detects_duplicates_and_gaps() {
        let ok = report(vec![
            CallOutcome::Completed(CallResult::new(1, "a")),
            CallOutcome::Failed(OperationFailure::new(0, "x")),
        ]);
        assert!(ok.covers(2));

        let dup = report(vec![
            CallOutcome::Completed(CallResult::new(1, "a")),
            CallOutcome::Completed(CallResult::new(1, "b")),
        ]);
        assert!(!dup.covers(2));

        let out_of_range = report(vec![CallOutcome::Skipped { id: 5 }]);
        assert!(!out_of_range.covers(1));
    }

    #[test]
    fn test_into_result_aggregates_failures() {
        let r = report(vec![
            CallOutcome::Completed(CallResult::new(2, "v2")),
            CallOutcome::Failed(OperationFailure::new(1, "boom")),
            CallOutcome::Skipped { id: 0 },
        ]);

        let err = r.into_result().unwrap_err();
        match err {
            CallError::Aggregate {
                failed,
                total,
                failures,
            } => {
                assert_eq!(failed, 2);
                assert_eq!(total, 3);
                assert_eq!(failures[0].id, 0);
                assert_eq!(failures[1].id, 1);
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
    }

    #[test]
    fn test_values_are_id_ordered() {
        let r = report(vec![
            CallOutcome::Completed(CallResult::new(2, "c")),
            CallOutcome::Completed(CallResult::new(0, "a")),
            CallOutcome::Completed(CallResult::new(1, "b")),
        ]);
        let values: Vec<_> = r.values().into_iter().collect();
        assert_eq!(
            values,
            vec![(0, "a".into()), (1, "b".into()), (2, "c".into())]
        );
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(CallOutcome::Skipped { id: 4 }).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["id"], 4);
    }
}
