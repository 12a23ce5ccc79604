//! Bounded retry with exponential backoff, used while waiting on
//! dependencies (database, catalog) during startup.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_delay, max_delay, ..Self::default() }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(scaled.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached,
/// returning the last error on exhaustion.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    dependency: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        event_name = "system.retry.recovered",
                        dependency = dependency,
                        attempt = attempt,
                        "dependency became ready after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                warn!(
                    event_name = "system.retry.exhausted",
                    dependency = dependency,
                    attempt = attempt,
                    error = %error,
                    "dependency still unavailable after all attempts"
                );
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    event_name = "system.retry.waiting",
                    dependency = dependency,
                    attempt = attempt,
                    attempts_left = max_attempts - attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "dependency unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
