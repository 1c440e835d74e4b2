//! Retry utilities for resilient archive operations
//!
//! Catalog queries go through a shared retry mechanism with exponential
//! backoff. Whether an exhausted retry budget is fatal is decided by the
//! caller (required roles escalate, optional roles degrade to empty results).

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, counting the first one
    pub max_tries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with a custom attempt budget
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries: max_tries.max(1),
            ..Default::default()
        }
    }

    /// Delay applied before the given attempt (attempt 1 starts immediately)
    fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay_ms.saturating_mul(1u64 << (attempt - 2).min(32));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Execute an operation up to `config.max_tries` times.
///
/// Attempts are numbered from 1 and each failure is logged with its attempt
/// counter. The last error is returned once the budget is exhausted.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, label: &str, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_tries = config.max_tries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let delay = config.delay_before(attempt);
        if !delay.is_zero() {
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                label = label,
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, label = label, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt >= max_tries => {
                warn!(
                    attempt = attempt,
                    max_tries = max_tries,
                    label = label,
                    error = %e,
                    "Attempt failed; retry budget exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_tries = max_tries,
                    label = label,
                    error = %e,
                    "Attempt failed"
                );
            }
        }
    }
}
