//! # Retry Execution
//!
//! Runs a single unit of work up to `max_attempts` times with a delay between
//! attempts. The attempt counter lives in the call, so concurrent callers never share
//! a budget.
//!
//! Retry does not touch admission control. Callers that want both must hold one
//! admission ticket across the whole retry sequence (see
//! [`crate::service::ConcurrencyService::run_with_retry`]).

use crate::config::ConcurrencyConfig;
use crate::error::{ConcurrencyError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry budget and delay schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Never below 1.
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub delay_between_attempts: Duration,
    /// Growth factor applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            crate::config::DEFAULT_RETRIES,
            Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MILLISECONDS),
        )
    }
}

impl RetryPolicy {
    /// Constant delay between attempts
    pub fn fixed(max_attempts: u32, delay_between_attempts: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay_between_attempts,
            backoff_multiplier: 1.0,
            max_delay: None,
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::fixed(config.default_retries, config.retry_delay())
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self
            .delay_between_attempts
            .mul_f64(self.backoff_multiplier.powi(exponent));
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Executes work under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` until it succeeds or the attempt budget is spent
    pub async fn run<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        run_with_retry(work, &self.policy).await
    }
}

/// Run `work` under `policy`, failing with [`ConcurrencyError::RetriesExhausted`]
/// after `policy.max_attempts` consecutive failures.
pub async fn run_with_retry<T, F, Fut>(mut work: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match work().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt >= max_attempts => {
                error!(
                    attempts = attempt,
                    error = %format!("{err:#}"),
                    "Retries exhausted"
                );
                return Err(ConcurrencyError::RetriesExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %format!("{err:#}"),
                    "Attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
