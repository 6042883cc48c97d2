//! Error types for DWARA

use std::time::Duration;
use thiserror::Error;

/// Result type alias for DWARA operations
pub type Result<T> = std::result::Result<T, DwaraError>;

/// Library-level error type
#[derive(Error, Debug)]
pub enum DwaraError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure reported by a dispatched backend call.
///
/// The queue hands these back to the submitter untouched. The retry layer
/// inspects them only through [`CallError::retry_after`] and whatever
/// predicate the caller supplies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Connection-level failure (DNS, refused, reset)
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// Backend answered with a non-success status
    #[error("backend returned status {code}")]
    Status {
        code: u16,
        /// Parsed Retry-After hint, when the backend supplied one
        retry_after: Option<Duration>,
    },

    /// Authentication or authorization failure
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The dispatch was abandoned before a result could be delivered
    #[error("dispatch canceled")]
    Canceled,

    /// Anything the taxonomy above does not cover
    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Machine-readable "retry after" hint carried by rate-limit responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CallError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Default retryability classification.
    ///
    /// Transient transport failures and server-side statuses are worth
    /// re-attempting; permission failures and other client errors are not.
    /// 429 (rate limited) and 408 (request timeout) are the exceptions on
    /// the client side.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Network(_) | CallError::Timeout(_) => true,
            CallError::Status { code, .. } => *code >= 500 || *code == 429 || *code == 408,
            CallError::PermissionDenied(_) | CallError::Canceled | CallError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            CallError::Status {
                code: status.as_u16(),
                retry_after: None,
            }
        } else if err.is_connect() || err.is_request() {
            CallError::Network(err.to_string())
        } else {
            CallError::Other(err.to_string())
        }
    }
}
