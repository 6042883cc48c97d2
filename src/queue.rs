//! Serialized dispatch of outbound backend calls
//!
//! Submissions drain strictly in arrival order with at most one call in
//! flight at a time, each admitted through a shared [`TokenBucket`].
//! The queue changes only the timing of a call, never its result.
//!
//! # Dispatch Flow
//!
//! ```text
//! submit ──► pending list ──► drain loop ──► operation ──► submitter
//!                                │
//!                          TokenBucket
//!                     (wait, then acquire)
//! ```

use crate::error::CallError;
use crate::failure_log::{FailedCall, FailureLog};
use crate::limiter::TokenBucket;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Counters for queue monitoring
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Calls accepted by `submit`
    pub submitted: AtomicU64,
    /// Calls whose operation ran to completion
    pub dispatched: AtomicU64,
    /// Calls whose operation reported a failure
    pub failed: AtomicU64,
}

/// A call waiting its turn
struct QueuedCall {
    /// ULID ticket for log correlation
    ticket: String,
    /// The deferred operation, wrapped to deliver its own result
    run: BoxFuture<'static, ()>,
}

struct QueueInner {
    pending: Mutex<VecDeque<QueuedCall>>,
    /// True while a drain loop is running for this queue
    draining: AtomicBool,
    /// Shared separately so queued calls need no handle back to the
    /// queue that stores them
    metrics: Arc<QueueMetrics>,
    failure_log: Mutex<Option<Arc<FailureLog>>>,
}

/// FIFO queue that serializes backend calls through a token bucket
///
/// Handles are cheap to clone and share the same queue. Submissions must
/// happen inside a tokio runtime; the drain loop runs as a spawned task
/// and parks itself when the queue empties.
#[derive(Clone)]
pub struct DispatchQueue {
    limiter: Arc<TokenBucket>,
    inner: Arc<QueueInner>,
}

impl DispatchQueue {
    /// Create a queue gated by the given limiter
    pub fn new(limiter: Arc<TokenBucket>) -> Self {
        Self {
            limiter,
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                metrics: Arc::new(QueueMetrics::default()),
                failure_log: Mutex::new(None),
            }),
        }
    }

    /// Capture failed dispatches into `log`
    pub fn with_failure_log(self, log: Arc<FailureLog>) -> Self {
        *self.inner.failure_log.lock() = Some(log);
        self
    }

    /// Submit an operation for serialized dispatch
    ///
    /// The operation is invoked only when its turn comes and the limiter
    /// admits it; its own success or failure is delivered through the
    /// returned future unchanged. Dropping the returned future abandons
    /// the wait but not the dispatch: the operation still runs in order
    /// and its result is discarded.
    pub fn submit<T, F, Fut>(&self, op: F) -> impl Future<Output = Result<T, CallError>> + Send
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let ticket = ulid::Ulid::new().to_string();
        let run_ticket = ticket.clone();
        let metrics = Arc::clone(&self.inner.metrics);
        let failure_log = self.inner.failure_log.lock().clone();

        // The operation itself starts when this future is first polled,
        // which the drain loop does only after admission.
        let run: BoxFuture<'static, ()> = Box::pin(async move {
            let result = op().await;
            match &result {
                Ok(_) => {
                    debug!(ticket = %run_ticket, "dispatch completed");
                }
                Err(err) => {
                    metrics.failed.fetch_add(1, Ordering::Relaxed);
                    if let Some(log) = &failure_log {
                        log.record(FailedCall::new(run_ticket.clone(), err.to_string()));
                    }
                    debug!(ticket = %run_ticket, error = %err, "dispatch failed");
                }
            }
            // Submitter may have dropped its handle; discard the result then.
            let _ = tx.send(result);
        });

        self.inner.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.lock().push_back(QueuedCall { ticket, run });
        self.ensure_draining();

        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(CallError::Canceled),
            }
        }
    }

    /// Number of calls waiting for dispatch
    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Check if no calls are waiting
    pub fn is_empty(&self) -> bool {
        self.inner.pending.lock().is_empty()
    }

    /// Calls accepted by `submit`
    pub fn total_submitted(&self) -> u64 {
        self.inner.metrics.submitted.load(Ordering::Relaxed)
    }

    /// Calls whose operation ran to completion
    pub fn total_dispatched(&self) -> u64 {
        self.inner.metrics.dispatched.load(Ordering::Relaxed)
    }

    /// Calls whose operation reported a failure
    pub fn total_failed(&self) -> u64 {
        self.inner.metrics.failed.load(Ordering::Relaxed)
    }

    /// Start the drain loop unless one is already running
    fn ensure_draining(&self) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tokio::spawn(drain_loop(
                Arc::clone(&self.limiter),
                Arc::clone(&self.inner),
            ));
        }
    }
}

/// Drain pending calls one at a time, gated by the limiter
///
/// Exits when the queue empties; `submit` starts a fresh loop for the
/// next burst of work. The idle transition double-checks the pending
/// list so a racing `submit` is never stranded.
async fn drain_loop(limiter: Arc<TokenBucket>, inner: Arc<QueueInner>) {
    loop {
        if inner.pending.lock().is_empty() {
            inner.draining.store(false, Ordering::Release);
            if inner.pending.lock().is_empty() {
                return;
            }
            // A submit raced the idle transition; re-claim the loop or
            // leave it to the one that submit spawned.
            if inner
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            continue;
        }

        // Wait out the limiter. Acquisition can still fail when another
        // consumer shares the bucket; recompute and wait again.
        loop {
            let wait = limiter.time_until_next_token();
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "rate limited, waiting");
                tokio::time::sleep(wait).await;
            }
            if limiter.try_acquire() {
                break;
            }
        }

        let next = inner.pending.lock().pop_front();
        let Some(call) = next else {
            // Nothing left to run for the token we took
            continue;
        };

        debug!(ticket = %call.ticket, "dispatching");
        call.run.await;
        inner.metrics.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}
