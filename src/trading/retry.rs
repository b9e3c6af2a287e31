//! Bounded exponential backoff for transient venue failures.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

use crate::error::Result;
use crate::shutdown::Shutdown;

/// Retry policy for a single operation (feed read, balance read, placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay doubles per attempt up to `max_delay`, without jitter.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `op`, retrying transient errors.
    ///
    /// Gives up with the last error once attempts are exhausted, on any
    /// non-transient error, or when shutdown is observed before a retry sleep.
    pub async fn run<T, F, Fut>(&self, operation: &str, shutdown: &Shutdown, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut schedule = self.schedule();
        let mut shutdown = shutdown.clone();
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.max_attempts || shutdown.is_triggered() {
                return Err(err);
            }

            let delay = schedule.next_backoff().unwrap_or(self.max_delay);
            warn!(
                operation = operation,
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );

            if shutdown.sleep(delay).await {
                return Err(err);
            }
            attempt += 1;
        }
    }
}
