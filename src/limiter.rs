//! Token bucket admission control for outbound backend calls
//!
//! Answers "may a call go out now?" and "how long until it may?".
//! Refill happens on read from elapsed time, so no background timer is
//! needed and the bucket is purely a function of the clock.
//! Thread-safe, lock-free, O(1) per check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One whole token, in scaled units.
///
/// Token counts are stored scaled by 1000 so the arithmetic stays in
/// integers without losing sub-token precision.
const TOKEN_SCALE: u64 = 1000;

/// Continuously refilling token bucket
///
/// Allows `rate` dispatches per second with a burst capacity of `burst`.
/// Tokens accrue whole-token at a time; the unaccounted remainder of the
/// current refill interval is preserved by leaving `last_refill` untouched
/// until a full interval has elapsed.
pub struct TokenBucket {
    /// Max tokens in the bucket, scaled
    capacity: u64,
    /// Nanoseconds to accrue one whole token
    refill_nanos: u64,
    /// Available tokens, scaled
    tokens: AtomicU64,
    /// Last accounted refill, nanos since `start`
    last_refill: AtomicU64,
    /// Time origin; uses the tokio clock so tests can drive it
    start: Instant,
}

impl TokenBucket {
    /// Create a new bucket
    ///
    /// # Arguments
    /// * `rate` - Tokens added per second (0 = never refills)
    /// * `burst` - Bucket capacity. If 0, nothing is ever admitted.
    pub fn new(rate: u64, burst: u64) -> Self {
        let refill_nanos = if rate == 0 {
            u64::MAX
        } else {
            1_000_000_000 / rate
        };

        let scaled_burst = burst.saturating_mul(TOKEN_SCALE);

        Self {
            capacity: scaled_burst,
            refill_nanos,
            tokens: AtomicU64::new(scaled_burst),
            last_refill: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Try to take one token
    ///
    /// Refills from elapsed time first. Returns false when less than one
    /// whole token is available.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current < TOKEN_SCALE {
                return false;
            }

            if self
                .tokens
                .compare_exchange_weak(
                    current,
                    current - TOKEN_SCALE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
            // lost the race, re-read
        }
    }

    /// Time until a whole token will be available
    ///
    /// Refills first, without consuming. Returns zero when a token is
    /// already there. The answer is a snapshot: with other consumers on
    /// the same bucket, callers must still confirm with [`try_acquire`]
    /// after waiting.
    ///
    /// [`try_acquire`]: TokenBucket::try_acquire
    pub fn time_until_next_token(&self) -> Duration {
        self.refill();

        if self.tokens.load(Ordering::Acquire) >= TOKEN_SCALE {
            return Duration::ZERO;
        }

        // Credit for the partially elapsed interval is carried in
        // (now - last_refill); the next whole token lands when the
        // interval completes.
        let now_nanos = self.elapsed_nanos();
        let since_refill = now_nanos.saturating_sub(self.last_refill.load(Ordering::Acquire));
        let remaining = self.refill_nanos.saturating_sub(since_refill);

        // A refill may land between the load above and here; report at
        // least one nanosecond so callers re-check rather than spin.
        Duration::from_nanos(remaining.max(1))
    }

    /// Currently available whole tokens, with fractional part
    pub fn available(&self) -> f64 {
        self.refill();
        self.tokens.load(Ordering::Acquire) as f64 / TOKEN_SCALE as f64
    }

    /// Bucket capacity in whole tokens
    pub fn capacity(&self) -> u64 {
        self.capacity / TOKEN_SCALE
    }

    fn elapsed_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Refill tokens based on elapsed time
    ///
    /// A CAS loop on `last_refill` ensures each elapsed interval is
    /// credited exactly once when multiple threads race here.
    fn refill(&self) {
        let now_nanos = self.elapsed_nanos();

        loop {
            let last = self.last_refill.load(Ordering::Acquire);
            let elapsed = now_nanos.saturating_sub(last);

            let intervals = elapsed / self.refill_nanos;
            if intervals == 0 {
                return;
            }

            let new_last = last + intervals * self.refill_nanos;

            if self
                .last_refill
                .compare_exchange_weak(last, new_last, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // another thread claimed the interval, re-read
                continue;
            }

            let earned = intervals.saturating_mul(TOKEN_SCALE);
            loop {
                let current = self.tokens.load(Ordering::Acquire);
                let refilled = current.saturating_add(earned).min(self.capacity);
                if current == refilled {
                    return;
                }
                if self
                    .tokens
                    .compare_exchange_weak(
                        current,
                        refilled,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}
