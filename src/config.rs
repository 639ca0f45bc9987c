//! Runtime configuration for a run.
//!
//! The call count and the concurrency ceiling are passed into every runner
//! explicitly; nothing here is process-wide.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, Result, ResultExt};

/// What the batch scheduler does after a call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Keep launching the remaining ids and report every failure at the end.
    #[default]
    ContinueAndReport,
    /// Stop launching new ids after the first failure, but drain what is in flight.
    StopLaunching,
}

/// Configuration shared by all runners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRunConfig")]
pub struct RunConfig {
    /// Number of work units `N`; ids are `0..N`.
    pub call_count: usize,
    /// Concurrency ceiling `B` for the batch scheduler (default: 4).
    pub batch_size: usize,
    /// Failure handling for the batch scheduler (default: continue and report).
    pub failure_policy: FailurePolicy,
}

/// Calls made when no count is configured.
pub const DEFAULT_CALL_COUNT: usize = 18;
/// Concurrency ceiling used when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 4;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            call_count: DEFAULT_CALL_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RunConfig {
    /// Create a config for `call_count` calls with the default ceiling and policy.
    pub fn new(call_count: usize) -> Self {
        Self {
            call_count,
            ..Default::default()
        }
    }

    /// Set the concurrency ceiling. Not clamped; [`RunConfig::validate`] rejects zero.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set what the batch scheduler does after a failed call.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Reject configurations that no runner can execute.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 1 {
            return Err(CallError::config(format!(
                "batch size must be at least 1, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }

    /// Parse a JSON document such as `{"callCount": 18, "batchSize": 4}`.
    ///
    /// Missing keys fall back to the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawRunConfig = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// Load a JSON config from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(format!("reading run config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

/// Wire form with signed counts so negative values surface as configuration
/// errors instead of opaque parse failures.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRunConfig {
    call_count: i64,
    batch_size: i64,
    failure_policy: FailurePolicy,
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            call_count: DEFAULT_CALL_COUNT as i64,
            batch_size: DEFAULT_BATCH_SIZE as i64,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = CallError;

    fn try_from(raw: RawRunConfig) -> Result<Self> {
        let call_count = usize::try_from(raw.call_count).map_err(|_| {
            CallError::config(format!("call count must not be negative, got {}", raw.call_count))
        })?;
        let batch_size = usize::try_from(raw.batch_size).map_err(|_| {
            CallError::config(format!("batch size must be at least 1, got {}", raw.batch_size))
        })?;
        let config = Self {
            call_count,
            batch_size,
            failure_policy: raw.failure_policy,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_constants() {
        let config = RunConfig::default();
        assert_eq!(config.call_count, 18);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueAndReport);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = RunConfig::new(3).with_batch_size(0).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_json_applies_defaults_and_policy() {
        let config =
            RunConfig::from_json_str(r#"{"callCount": 6, "failurePolicy": "stopLaunching"}"#)
                .unwrap();
        assert_eq!(config.call_count, 6);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.failure_policy, FailurePolicy::StopLaunching);
    }

    #[test]
    fn test_from_json_rejects_negative_count() {
        let err = RunConfig::from_json_str(r#"{"callCount": -1}"#).unwrap_err();
        assert!(err.is_configuration(), "{err}");
    }

    #[test]
    fn test_from_json_rejects_zero_batch() {
        let err = RunConfig::from_json_str(r#"{"batchSize": 0}"#).unwrap_err();
        assert!(err.is_configuration(), "{err}");
    }

    #[test]
    fn test_from_file_reports_missing_path() {
        let err = RunConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CallError::Context(_)));
    }

    #[test]
    fn test_serde_round_trip_through_try_from() {
        let config = RunConfig::new(9).with_batch_size(3);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"callCount\":9"));
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
