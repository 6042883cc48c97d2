//! Record of failed dispatches for inspection
//!
//! Bounded in-memory log. NOT a persistent dead letter queue - records are
//! lost on restart; this is for debugging and for application-driven
//! re-submission. When full, the oldest record is evicted.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A failed backend call with metadata about the failure
#[derive(Debug, Clone)]
pub struct FailedCall {
    /// Dispatch ticket of the failed call
    pub ticket: String,
    /// Error message from the failure
    pub error: String,
    /// When the failure occurred
    pub failed_at: Instant,
    /// Delivery attempts seen by the log; retried calls appear once per
    /// dispatched attempt
    pub attempts: u32,
}

impl FailedCall {
    /// Record a single failed attempt
    pub fn new(ticket: String, error: String) -> Self {
        Self {
            ticket,
            error,
            failed_at: Instant::now(),
            attempts: 1,
        }
    }
}

/// Bounded in-memory log of failed dispatches
pub struct FailureLog {
    calls: Mutex<VecDeque<FailedCall>>,
    capacity: usize,
    /// Metrics: records ever captured
    total_captured: AtomicU64,
    /// Metrics: records evicted for capacity
    total_dropped: AtomicU64,
}

impl FailureLog {
    /// Create a log retaining up to `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            calls: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            total_captured: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Add a failed call, evicting the oldest record if at capacity
    pub fn record(&self, call: FailedCall) {
        let mut calls = self.calls.lock();
        if calls.len() >= self.capacity {
            calls.pop_front();
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
        }
        calls.push_back(call);
        self.total_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return up to `n` records, oldest first
    pub fn drain(&self, n: usize) -> Vec<FailedCall> {
        let mut calls = self.calls.lock();
        let count = n.min(calls.len());
        calls.drain(..count).collect()
    }

    /// Look at up to `n` records without removing them
    pub fn peek(&self, n: usize) -> Vec<FailedCall> {
        let calls = self.calls.lock();
        calls.iter().take(n).cloned().collect()
    }

    /// Current number of records
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Records ever captured
    pub fn total_captured(&self) -> u64 {
        self.total_captured.load(Ordering::Relaxed)
    }

    /// Records evicted for capacity
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    /// Discard all records
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_len() {
        let log = FailureLog::new(100);

        log.record(FailedCall::new("t-1".into(), "network error".into()));

        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = FailureLog::new(3);

        for i in 0..5 {
            log.record(FailedCall::new(format!("t-{i}"), "boom".into()));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.total_captured(), 5);
        assert_eq!(log.total_dropped(), 2);

        let records = log.drain(10);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ticket, "t-2");
        assert_eq!(records[1].ticket, "t-3");
        assert_eq!(records[2].ticket, "t-4");
    }

    #[test]
    fn test_drain_removes_in_order() {
        let log = FailureLog::new(100);

        for i in 0..5 {
            log.record(FailedCall::new(format!("t-{i}"), "boom".into()));
        }

        let first = log.drain(3);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].ticket, "t-0");
        assert_eq!(log.len(), 2);

        let rest = log.drain(10);
        assert_eq!(rest.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_peek_leaves_records() {
        let log = FailureLog::new(100);

        for i in 0..3 {
            log.record(FailedCall::new(format!("t-{i}"), "boom".into()));
        }

        let peeked = log.peek(2);
        assert_eq!(peeked.len(), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clear() {
        let log = FailureLog::new(100);

        log.record(FailedCall::new("t-1".into(), "boom".into()));
        assert_eq!(log.len(), 1);

        log.clear();
        assert!(log.is_empty());
    }
}
