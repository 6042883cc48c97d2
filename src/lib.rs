//! DWARA - Outbound Request Governor
//!
//! The front door for every MithilaSanskar storefront call to the hosted
//! backend. Calls pass a token bucket, drain one at a time in arrival
//! order, and can be wrapped with bounded exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! Callers ──► DispatchQueue (FIFO, single flight) ──► hosted backend
//!                    │
//!              TokenBucket (admission)
//! ```
//!
//! The pieces compose but do not require each other: [`TokenBucket`] and
//! [`DispatchQueue`] govern timing, [`with_retry`] governs re-attempts,
//! and [`Gate`] wires all three behind one handle.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod error;
pub mod failure_log;
pub mod gate;
pub mod http;
pub mod limiter;
pub mod observability;
pub mod queue;
pub mod retry;

pub use config::Config;
pub use error::{CallError, DwaraError, Result};
pub use failure_log::{FailedCall, FailureLog};
pub use gate::Gate;
pub use limiter::TokenBucket;
pub use queue::DispatchQueue;
pub use retry::{RetryPolicy, with_retry, with_retry_if};
