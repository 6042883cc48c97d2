//! Classification of hosted-backend HTTP responses
//!
//! The governor treats a backend call as an opaque operation; these
//! helpers are how an application folds a `reqwest` response into the
//! [`CallError`] taxonomy, so retry predicates can match on status codes
//! and the retry layer can honor Retry-After hints.
//!
//! # Example
//!
//! ```ignore
//! let response = client.get(&url).send().await.map_err(CallError::from)?;
//! let response = http::check_status(response)?;
//! ```

use crate::error::CallError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use std::time::Duration;

/// Pass successful responses through, fold everything else into [`CallError`]
///
/// 401 and 403 become [`CallError::PermissionDenied`]; any other
/// non-success status becomes [`CallError::Status`] with the Retry-After
/// hint attached when present.
pub fn check_status(response: Response) -> Result<Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CallError::PermissionDenied(format!(
            "backend returned {status}"
        )));
    }

    Err(CallError::Status {
        code: status.as_u16(),
        retry_after: parse_retry_after(&response),
    })
}

/// Parse a Retry-After header given in whole seconds
///
/// The HTTP-date form is not handled; the hosted backend only emits the
/// seconds form on rate-limit responses.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode as AxumStatus, header};
    use axum::routing::get;
    use std::net::SocketAddr;

    async fn ok() -> &'static str {
        "fine"
    }

    async fn rate_limited() -> (AxumStatus, HeaderMap, &'static str) {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "2".parse().unwrap());
        (AxumStatus::TOO_MANY_REQUESTS, headers, "slow down")
    }

    async fn unauthorized() -> AxumStatus {
        AxumStatus::UNAUTHORIZED
    }

    async fn unavailable() -> AxumStatus {
        AxumStatus::SERVICE_UNAVAILABLE
    }

    /// Start a mock backend, returns its address
    async fn start_mock_backend() -> SocketAddr {
        let app = Router::new()
            .route("/ok", get(ok))
            .route("/rate-limited", get(rate_limited))
            .route("/unauthorized", get(unauthorized))
            .route("/unavailable", get(unavailable));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server time to start
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        addr
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let addr = start_mock_backend().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/ok"))
            .send()
            .await
            .unwrap();

        let response = check_status(response).unwrap();
        assert_eq!(response.text().await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let addr = start_mock_backend().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/rate-limited"))
            .send()
            .await
            .unwrap();

        let err = check_status(response).unwrap_err();
        assert_eq!(
            err,
            CallError::Status {
                code: 429,
                retry_after: Some(Duration::from_secs(2)),
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unauthorized_is_permission_denied() {
        let addr = start_mock_backend().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/unauthorized"))
            .send()
            .await
            .unwrap();

        let err = check_status(response).unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_without_hint() {
        let addr = start_mock_backend().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/unavailable"))
            .send()
            .await
            .unwrap();

        let err = check_status(response).unwrap_err();
        assert_eq!(
            err,
            CallError::Status {
                code: 503,
                retry_after: None,
            }
        );
    }

    #[tokio::test]
    async fn test_connection_error_maps_to_network() {
        // Nothing listens here; the connect fails fast
        let client = reqwest::Client::new();
        let err = client
            .get("http://127.0.0.1:1/unreachable")
            .send()
            .await
            .map(|_| ())
            .map_err(CallError::from)
            .unwrap_err();

        assert!(matches!(err, CallError::Network(_)));
    }
}
