//! Retry policy for the vision backend invocation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

/// Errors that can classify themselves as worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Capped exponential backoff with additive jitter.
///
/// Attempt `k` (1-based) waits `base * 2^(k-1) + uniform(0, base)`, capped
/// at [`RetryPolicy::MAX_DELAY`]. A policy with `max_retries` performs at
/// most `max_retries + 1` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Ceiling on any single backoff sleep.
    pub const MAX_DELAY: Duration = Duration::from_secs(10);

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }

    fn delay_with(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(16) as i32;
        let scaled = (base_ms as f64) * 2f64.powi(exp);
        let jitter = rng.random_range(0..base_ms) as f64;
        let capped = (scaled + jitter).min(Self::MAX_DELAY.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Runs `op`, retrying retryable failures with backoff.
    ///
    /// `label` names the call site in the retry log stream.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            target: "analysis::retry",
                            label, attempt, "call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt <= self.max_retries && err.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "analysis::retry",
                        label,
                        attempt,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        target: "analysis::retry",
                        label, attempt, error = %err, "giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}
