//! Exponential backoff with jitter, for callers (typically a
//! [`crate::model::Model`] adapter) that need to retry a transient failure
//! without the agent loop itself knowing about it — the core's own
//! recoverable-error path (context overflow) goes through
//! [`crate::conversation::SummarizingConversationManager`] instead, not
//! through this module.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters. `base_delay` is the delay before the first retry;
/// each subsequent attempt doubles it, capped at `max_delay`. Actual sleep
/// durations returned by [`RetryPolicy::delay_for_attempt`] are jittered by
/// up to `jitter_fraction` of the computed delay, to avoid a thundering
/// herd of synchronized retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicy {
    /// The unjittered delay before retry attempt `attempt` (1-indexed: the
    /// delay before the *first* retry is `delay_for_attempt(1)`).
    fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay.as_secs_f64() * 2f64.powi(exponent as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// The delay to sleep before retry attempt `attempt`, with up to
    /// `jitter_fraction` of randomness applied on top of the exponential
    /// base (full-jitter style: uniformly sampled in
    /// `[base * (1 - jitter_fraction), base * (1 + jitter_fraction)]`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let mut rng = rand::thread_rng();
        let factor = 1.0 + rng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `operation` with retry per `policy`: on `Err`, sleeps
/// [`RetryPolicy::delay_for_attempt`] and tries again, up to
/// `policy.max_attempts` total attempts. Returns the last error if every
/// attempt fails.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(_) if policy.should_retry(attempt) => {
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
