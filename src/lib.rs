//! Strategies for calling a slow, latency-variable operation many times.
//!
//! Four runners share one interface ([`runners::Runner`]):
//!
//! - [`SequentialRunner`]: one call after another, the baseline
//! - [`ParallelRunner`]: every call at once
//! - [`BatchScheduler`]: never more than `batch_size` calls in flight
//! - [`OrderedCollector`]: lazy deferred calls, results read back in id order
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use call_strategies::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RunConfig::new(18).with_batch_size(4);
//!     let harness = Harness::new(BatchScheduler::new(RandomDelayService::new()));
//!
//!     let (report, metrics) = harness.run(&config).await?;
//!     for (id, value) in report.values() {
//!         print!("{id},{value};");
//!     }
//!     println!("\n{} ms, peak {} in flight", report.elapsed.as_millis(), metrics.peak_in_flight);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod operation;
pub mod runners;
pub mod service;
pub mod source;

pub use config::{FailurePolicy, RunConfig};
pub use error::{CallError, Result, ResultExt};
pub use models::{
    CallOutcome, CallResult, OperationFailure, ResultMap, RunReport, Strategy, WorkUnit,
};
pub use operation::{
    BlockingOperation, LambdaOperation, Offloaded, RemoteOperation, ScriptedOperation,
};
pub use runners::{
    run_blocking, BatchScheduler, DeferredCall, DeferredCalls, Harness, InstrumentedOperation,
    OrderedCollector, ParallelRunner, RunContext, RunEvent, RunMetrics, Runner, SequentialRunner,
    SharedResults, TraceEntry,
};
pub use service::RandomDelayService;
pub use source::WorkUnits;

/// Prelude module for convenient imports.
///
/// ```rust
/// use call_strategies::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{FailurePolicy, RunConfig};
    pub use crate::error::{CallError, Result, ResultExt};
    pub use crate::models::{CallOutcome, CallResult, ResultMap, RunReport, Strategy};
    pub use crate::operation::{BlockingOperation, LambdaOperation, Offloaded, RemoteOperation};
    pub use crate::runners::{
        BatchScheduler, Harness, OrderedCollector, ParallelRunner, RunContext, RunMetrics, Runner,
        SequentialRunner,
    };
    pub use crate::service::RandomDelayService;
}
