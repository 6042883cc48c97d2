//! Retry with exponential backoff for backend calls
//!
//! Wraps a single asynchronous operation with bounded re-attempts. The
//! delay grows multiplicatively up to a cap, and a rate-limit response
//! carrying a Retry-After hint overrides the computed delay for the next
//! attempt. Which failures qualify for retry is the caller's decision.

use crate::error::CallError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff configuration for [`with_retry`] / [`with_retry_if`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Re-attempts after the initial call; total invocations are
    /// `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first re-attempt
    pub initial_delay: Duration,
    /// Cap on the computed delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each re-attempt
    pub backoff_multiplier: f64,
    /// Max additive random jitter per wait; `None` keeps backoff
    /// deterministic
    pub jitter: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: None,
        }
    }
}

/// Execute `op`, re-attempting every failure until the policy is exhausted
///
/// Returns the first success, or the failure of the final attempt
/// unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    with_retry_if(policy, op, |_| true).await
}

/// Execute `op`, re-attempting failures that `should_retry` accepts
///
/// A rejected failure propagates immediately, regardless of how many
/// attempts remain.
pub async fn with_retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    mut should_retry: P,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
    P: FnMut(&CallError) -> bool,
{
    let mut attempt: u32 = 0;
    let mut delay = policy.initial_delay;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !should_retry(&err) {
                    return Err(err);
                }

                // A rate-limit response dictates its own pause.
                if let Some(hinted) = err.retry_after() {
                    delay = hinted;
                }

                let pause = apply_jitter(delay, policy.jitter);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = pause.as_millis() as u64,
                    error = %err,
                    "backend call failed, retrying"
                );
                tokio::time::sleep(pause).await;

                delay = scale_delay(delay, policy.backoff_multiplier).min(policy.max_delay);
                attempt += 1;
            }
        }
    }
}

/// Grow the delay, saturating instead of overflowing
fn scale_delay(delay: Duration, multiplier: f64) -> Duration {
    let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        1.0
    };
    let scaled = delay.as_secs_f64() * multiplier;
    Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
}

fn apply_jitter(delay: Duration, jitter: Option<Duration>) -> Duration {
    match jitter {
        Some(max) if !max.is_zero() => {
            let extra = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            delay.saturating_add(Duration::from_millis(extra))
        }
        _ => delay,
    }
}
