//! Gate - the front door for outbound backend calls
//!
//! Owns one limiter and one dispatch queue and carries the default retry
//! policy. Construct a Gate at startup and hand clones to whatever issues
//! backend calls; it holds no external resources, so there is nothing to
//! tear down.
//!
//! # Example
//!
//! ```ignore
//! use dwara::{Config, Gate};
//!
//! let gate = Gate::from_config(&Config::from_env()?);
//!
//! let order = gate
//!     .call_with_retry(|| async { backend.fetch_order(order_id).await })
//!     .await?;
//! ```

use crate::config::Config;
use crate::error::CallError;
use crate::failure_log::FailureLog;
use crate::limiter::TokenBucket;
use crate::queue::DispatchQueue;
use crate::retry::{self, RetryPolicy};
use std::future::Future;
use std::sync::Arc;

/// Composition of limiter, queue, and retry policy
///
/// Every call admitted through the same Gate shares one token bucket and
/// one FIFO queue, so dispatch order and rate are global to the instance.
/// Retry wrapping is per call: each attempt re-enters the queue and pays
/// for its own token.
#[derive(Clone)]
pub struct Gate {
    limiter: Arc<TokenBucket>,
    queue: DispatchQueue,
    policy: RetryPolicy,
}

impl Gate {
    /// Create a Gate allowing `rate` calls per second with a burst of
    /// `burst`, with the default retry policy
    pub fn new(rate: u64, burst: u64) -> Self {
        let limiter = Arc::new(TokenBucket::new(rate, burst));
        let queue = DispatchQueue::new(Arc::clone(&limiter));
        Self {
            limiter,
            queue,
            policy: RetryPolicy::default(),
        }
    }

    /// Create a Gate from configuration
    pub fn from_config(config: &Config) -> Self {
        let limiter = Arc::new(TokenBucket::new(config.rate, config.burst));
        let queue = DispatchQueue::new(Arc::clone(&limiter));
        Self {
            limiter,
            queue,
            policy: config.retry_policy(),
        }
    }

    /// Replace the retry policy used by `call_with_retry`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Capture failed dispatches into `log`
    pub fn with_failure_log(mut self, log: Arc<FailureLog>) -> Self {
        self.queue = self.queue.with_failure_log(log);
        self
    }

    /// The shared limiter
    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    /// The shared queue
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Dispatch one call through the queue, without retry
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        self.queue.submit(op).await
    }

    /// Dispatch with the Gate's retry policy, re-attempting every failure
    pub async fn call_with_retry<T, F, Fut>(&self, op: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        self.call_with_retry_if(op, |_| true).await
    }

    /// Dispatch with retry, re-attempting only failures `should_retry`
    /// accepts
    pub async fn call_with_retry_if<T, F, Fut, P>(
        &self,
        op: F,
        should_retry: P,
    ) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CallError>> + Send + 'static,
        P: FnMut(&CallError) -> bool,
    {
        let queue = self.queue.clone();
        retry::with_retry_if(
            &self.policy,
            move || {
                let queue = queue.clone();
                let op = op.clone();
                async move { queue.submit(op).await }
            },
            should_retry,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_call_passes_value_through() {
        let gate = Gate::new(1_000, 1_000);

        let value = gate.call(|| async { Ok::<_, CallError>("cart") }).await;
        assert_eq!(value.unwrap(), "cart");
    }

    #[tokio::test]
    async fn test_call_consumes_a_token() {
        let gate = Gate::new(0, 5); // no refill, observable balance

        gate.call(|| async { Ok::<_, CallError>(()) }).await.unwrap();

        assert_eq!(gate.limiter().available(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_retry_recovers() {
        let gate = Gate::new(1_000, 1_000).with_retry_policy(RetryPolicy {
            max_retries: 3,
            initial_delay: std::time::Duration::from_millis(1),
            ..Default::default()
        });

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = gate
            .call_with_retry(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CallError::Network("flaky".into()))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(gate.queue().total_submitted(), 3);
    }

    #[tokio::test]
    async fn test_failure_log_wiring() {
        let log = Arc::new(FailureLog::new(10));
        let gate = Gate::new(1_000, 1_000).with_failure_log(Arc::clone(&log));

        let _ = gate
            .call(|| async { Err::<(), _>(CallError::Other("boom".into())) })
            .await;

        assert_eq!(log.len(), 1);
    }
}
