//! Bounded retry combinator
//!
//! Shared by the gas-estimation retry, the simulation retry and every
//! polling wait (pending transactions, already-known confirmation, receipts,
//! nonce-lock acquisition).

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; at least 1
    pub max_attempts: u32,
    /// Sleep between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff }
    }

    /// One initial attempt plus `retries` immediate retries.
    pub fn immediate(retries: u32) -> Self {
        Self::new(retries + 1, Duration::ZERO)
    }

    /// Polls every `interval` for at most `budget` (first poll is immediate).
    pub fn polling(budget: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let polls = (budget.as_millis() / interval_ms) as u32;
        Self::new(polls.saturating_add(1), interval)
    }

    /// Upper bound of the time spent sleeping.
    pub fn budget(&self) -> Duration {
        self.backoff * (self.max_attempts - 1)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted. `op` receives the zero-based attempt number so
    /// callers can adjust inputs (e.g. double a gas limit) between attempts.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - First successful attempt
    /// * `Err(E)` - The first non-retryable error, or the last retryable one
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt + 1 < self.max_attempts => {
                    debug!("Attempt {}/{} failed, retrying", attempt + 1, self.max_attempts);
                    attempt += 1;
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
