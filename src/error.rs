//! Error types for the concurrency core.
//!
//! All-or-nothing calls (`run_concurrently`, `run_batch`) surface failures through
//! [`ConcurrencyError`]. HTTP fan-out never raises per-request failures; those are
//! recorded as data in [`crate::http::Outcome`].

use crate::config::ConfigurationError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConcurrencyError {
    /// A unit of work failed and aborted the whole call. `message` is the
    /// original error text, unaltered.
    #[error("Operation '{name}' failed: {message}")]
    OperationFailed { name: String, message: String },

    /// Every attempt allowed by the retry policy failed.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: anyhow::Error,
    },

    #[error("Concurrent execution timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ConcurrencyError {
    pub(crate) fn operation_failed(name: impl Into<String>, error: &anyhow::Error) -> Self {
        // `{:#}` keeps the whole context chain on one line
        ConcurrencyError::OperationFailed {
            name: name.into(),
            message: format!("{error:#}"),
        }
    }

    /// The underlying failure text without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            ConcurrencyError::OperationFailed { message, .. } => message.clone(),
            ConcurrencyError::RetriesExhausted { last_error, .. } => format!("{last_error:#}"),
            other => other.to_string(),
        }
    }

    /// Name of the failed operation, when the error came from one.
    pub fn operation_name(&self) -> Option<&str> {
        match self {
            ConcurrencyError::OperationFailed { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ConcurrencyError::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConcurrencyError>;
