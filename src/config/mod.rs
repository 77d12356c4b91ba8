//! # Concurrency Configuration
//!
//! Settings for the concurrency core, loaded once at process start. The concurrency
//! limit is the only value that changes at runtime, and that happens through
//! [`crate::admission::AdmissionController::set_limit`] rather than by mutating this
//! struct.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_concurrency::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let limit = manager.config().concurrency_limit;
//! let timeout = manager.config().timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 25;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MILLISECONDS: u64 = 100;

/// Root configuration for the concurrency core
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum number of units of work running at once
    pub concurrency_limit: usize,

    /// Default timeout for HTTP fan-out requests and whole-call deadlines
    pub timeout_seconds: u64,

    /// Chunk size used by `process_collection`
    pub default_batch_size: usize,

    /// Attempt budget for the default retry policy
    pub default_retries: u32,

    /// Delay between retry attempts
    pub retry_delay_milliseconds: u64,

    /// Run every "concurrent" call strictly one unit at a time
    pub disable_concurrency_in_testing: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            default_batch_size: DEFAULT_BATCH_SIZE,
            default_retries: DEFAULT_RETRIES,
            retry_delay_milliseconds: DEFAULT_RETRY_DELAY_MILLISECONDS,
            disable_concurrency_in_testing: false,
        }
    }
}

impl ConcurrencyConfig {
    /// Configuration for deterministic tests: same defaults, sequential execution
    pub fn for_testing() -> Self {
        Self {
            disable_concurrency_in_testing: true,
            ..Self::default()
        }
    }

    /// Get request/call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_milliseconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "concurrency_limit",
                "0",
                "concurrency limit must be a positive integer",
            ));
        }
        if self.default_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "default_batch_size",
                "0",
                "batch size must be a positive integer",
            ));
        }
        if self.default_retries == 0 {
            return Err(ConfigurationError::invalid_value(
                "default_retries",
                "0",
                "retry policy needs at least one attempt",
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "timeout_seconds",
                "0",
                "timeout must be at least one second",
            ));
        }
        Ok(())
    }
}
