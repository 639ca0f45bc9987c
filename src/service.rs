//! Stand-in for a slow remote service.
//!
//! Each call waits a random delay in `[0, max_delay)` milliseconds and returns
//! the id with the delay it waited, formatted as a string. It could just as
//! well be a service that looks up an image by id.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::{CallError, Result};
use crate::models::CallResult;
use crate::operation::{BlockingOperation, RemoteOperation};

/// Upper bound (exclusive) of the simulated latency, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy)]
pub struct RandomDelayService {
    max_delay_ms: u64,
}

impl Default for RandomDelayService {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RandomDelayService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_delay(max_delay: Duration) -> Result<Self> {
        let max_delay_ms = u64::try_from(max_delay.as_millis())
            .map_err(|_| CallError::config("maximum delay does not fit in milliseconds"))?;
        if max_delay_ms == 0 {
            return Err(CallError::config("maximum delay must be at least 1ms"));
        }
        Ok(Self { max_delay_ms })
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn pick_delay(&self) -> u64 {
        rand::rng().random_range(0..self.max_delay_ms)
    }
}

impl BlockingOperation for RandomDelayService {
    fn call_blocking(&self, id: usize) -> Result<CallResult> {
        let delay = self.pick_delay();
        std::thread::sleep(Duration::from_millis(delay));
        Ok(CallResult::new(id, delay.to_string()))
    }
}

/// Suspends on the runtime timer instead of blocking a thread. Wrap the service
/// in [`crate::Offloaded`] to run the blocking form on the blocking pool instead.
#[async_trait]
impl RemoteOperation for RandomDelayService {
    async fn call(&self, id: usize) -> Result<CallResult> {
        let delay = self.pick_delay();
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(CallResult::new(id, delay.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_max_delay() {
        let err = RandomDelayService::with_max_delay(Duration::ZERO).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_blocking_value_is_delay_below_max() {
        let service = RandomDelayService::with_max_delay(Duration::from_millis(5)).unwrap();
        for id in 0..10 {
            let result = service.call_blocking(id).unwrap();
            assert_eq!(result.id, id);
            let delay: u64 = result.value.parse().unwrap();
            assert!(delay < 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_form_keeps_id() {
        let service = RandomDelayService::new();
        let result = service.call(42).await.unwrap();
        assert_eq!(result.id, 42);
        assert!(result.value.parse::<u64>().unwrap() < DEFAULT_MAX_DELAY_MS);
    }
}
