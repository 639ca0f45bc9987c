//! Example: compare the four call strategies against a random-latency service.
//!
//! Each call sleeps for a random 0-500 ms and returns how long it slept. The
//! parallel strategies should finish in roughly the time of the slowest single
//! call, while the sequential baseline pays for every call.
//!
//! Run with: `cargo run --example compare_strategies`
//! Override the defaults with `CALL_COUNT=30 BATCH_SIZE=6`.

use call_strategies::prelude::*;
use call_strategies::run_blocking;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            CallError::config(format!("{name} must be a non-negative integer, got {raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}

fn print_report(label: &str, report: &RunReport) {
    for outcome in &report.outcomes {
        match outcome {
            CallOutcome::Completed(result) => print!("{},{};", result.id, result.value),
            CallOutcome::Failed(failure) => print!("{},!{};", failure.id, failure.message),
            CallOutcome::Skipped { id } => print!("{id},-;"),
        }
    }
    println!();
    println!(
        "{label} was done. Elapsed time: {} ms",
        report.elapsed.as_millis()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let defaults = RunConfig::default();
    let config = RunConfig::new(env_or("CALL_COUNT", defaults.call_count)?)
        .with_batch_size(env_or("BATCH_SIZE", defaults.batch_size)?);
    config.validate()?;

    let service = RandomDelayService::new();

    let strategies = [
        (
            "Call in parallel",
            Harness::new(ParallelRunner::new(Offloaded::new(service))).with_name("parallel"),
        ),
        (
            "Call in batches",
            Harness::new(BatchScheduler::new(Offloaded::new(service))).with_name("batches"),
        ),
        (
            "Call in order",
            Harness::new(OrderedCollector::new(service)).with_name("ordered"),
        ),
    ];

    for (label, harness) in &strategies {
        let (report, metrics) = harness.run(&config).await?;
        print_report(label, &report);
        println!("  peak in flight: {}", metrics.peak_in_flight);
    }

    let report = tokio::task::spawn_blocking(move || run_blocking(&service, config.call_count))
        .await
        .map_err(|e| CallError::Context(format!("sequential run did not finish: {e}")))?;
    print_report("Call synchronously", &report);

    println!("All done.");
    Ok(())
}
