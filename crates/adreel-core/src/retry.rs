//! Bounded retry with exponential backoff, and cancellation-aware waiting.

use std::future::Future;
use std::time::Duration;

use adreel_proto::CampaignError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

/// Awaits `fut` unless `cancel` fires first.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, CampaignError>
where
    F: Future<Output = Result<T, CampaignError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CampaignError::Cancelled),
        result = fut => result,
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), CampaignError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CampaignError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Runs `op` until it succeeds, fails permanently, or exhausts the policy.
///
/// Only errors for which [`CampaignError::is_transient`] holds are retried.
/// Use this for idempotent operations only.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, CampaignError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CampaignError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match until_cancelled(cancel, op(attempt)).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                sleep_or_cancel(cancel, delay).await?;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation, attempt, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}
