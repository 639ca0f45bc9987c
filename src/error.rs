use thiserror::Error;

use crate::models::OperationFailure;

/// Error types for running call strategies.
#[derive(Debug, Error)]
pub enum CallError {
    /// The remote operation failed for a single id.
    #[error("Operation failed for id {id}: {message}")]
    Operation { id: usize, message: String },

    /// The run configuration was rejected before any call was launched.
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more calls failed after every call in the run had finished.
    #[error("{failed} of {total} calls failed")]
    Aggregate {
        failed: usize,
        total: usize,
        failures: Vec<OperationFailure>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Context error: {0}")]
    Context(String),
}

impl CallError {
    /// Create an operation failure for the given id.
    pub fn operation(id: usize, message: impl Into<String>) -> Self {
        Self::Operation {
            id,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error was raised before any work started.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// The id this error belongs to, if it is tied to a single call.
    pub fn call_id(&self) -> Option<usize> {
        match self {
            Self::Operation { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Individual failures carried by an aggregate error.
    ///
    /// Returns an empty slice for every other variant.
    pub fn failures(&self) -> &[OperationFailure] {
        match self {
            Self::Aggregate { failures, .. } => failures,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<CallError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            CallError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}
