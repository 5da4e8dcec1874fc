use std::future::Future;
use std::time::Duration;

use crate::errors::PersistenceError;

/// Bounded exponential backoff for storage writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 50, backoff_multiplier: 2 }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, backoff_multiplier: 1 }
    }

    /// Delay before retry number `retry_count` (0 for the first retry).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(retry_count);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or attempts run
    /// out. Returns the last error.
    pub async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut retry_count = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && retry_count + 1 < attempts => {
                    let delay = self.delay_for(retry_count);
                    tracing::debug!(
                        event_name = "booking.storage_retry",
                        operation = operation_name,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying storage operation"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
