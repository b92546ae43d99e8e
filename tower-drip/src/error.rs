use std::time::Duration;

use drip_limit::Bucket;
use drip_limit::StoreError;

/// Errors produced by the Tower Drip middleware stack.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DripError {
    /// The request's key is out of tokens.
    ///
    /// Carries the bucket snapshot persisted by the rejecting decision,
    /// so callers can report remaining tokens and reset time.
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests` with `Retry-After` and `x-ratelimit-*`
    /// headers.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    Throttled {
        /// The bucket as persisted by the rejecting decision.
        bucket: Bucket,
        /// Time until the bucket reports fully reset.
        retry_after: Duration,
    },

    /// The key extractor produced no key for this request.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `500 Internal Server Error`.
    #[error("Unable to extract a rate limit key from the request")]
    Key,

    /// The bucket store failed and the limiter is running fail-closed.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `503 Service Unavailable`.
    #[error("Rate limit store unavailable: {0}")]
    Store(#[from] StoreError),

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner
    /// error. When the `axum` feature is enabled, this converts to
    /// `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for DripError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::HeaderValue;
        use axum::http::StatusCode;
        use axum::http::header::RETRY_AFTER;

        let msg = self.to_string();
        match self {
            Self::Throttled {
                bucket,
                retry_after,
            } => {
                let mut response = (StatusCode::TOO_MANY_REQUESTS, msg).into_response();
                let headers = response.headers_mut();
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after.as_secs().max(1)));
                headers.insert(
                    "x-ratelimit-remaining",
                    HeaderValue::from(bucket.tokens.floor() as u64),
                );
                headers.insert("x-ratelimit-reset", HeaderValue::from(bucket.rtime));
                response
            }
            Self::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, msg).into_response(),
            Self::Key | Self::Inner(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}
