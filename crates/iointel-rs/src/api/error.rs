//! Typed errors and HTTP status classification.
//!
//! Every failure surfaces as an [`ApiError`] carrying a closed [`ErrorKind`],
//! a human-readable message, and (for HTTP failures) the status code and raw
//! response body. The classifier is the single source of truth for which
//! errors the retry layer may retry.

use std::fmt;
use std::time::Duration;

/// Failure category for an API call.
///
/// Ordered by classification precedence: a 429 is always `RateLimited`,
/// never `ClientError`, and 401/403 are always `AuthFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 or 403.
    AuthFailed,
    /// HTTP 5xx.
    ServerError,
    /// Any other HTTP 4xx.
    ClientError,
    /// No response within the configured timeout.
    Timeout,
    /// Transport-level failure before any response was received.
    ConnectionFailed,
    /// Response received but not parseable as the expected JSON shape.
    InvalidResponse,
    /// Anything else.
    Unclassified,
}

impl ErrorKind {
    /// Whether the retry layer may retry an error of this kind.
    ///
    /// Rate limits and server errors are transient by contract; timeouts and
    /// connection failures are transient by nature. Everything else is
    /// terminal — in particular `InvalidResponse`, which indicates a
    /// protocol mismatch, not transience.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::Timeout
                | ErrorKind::ConnectionFailed
        )
    }

    /// Stable lowercase label, used as the `Display` prefix so log
    /// consumers can pattern-match the failure category.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ClientError => "client_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error from a single API call.
///
/// Constructed once at the failure site, then either retried (and
/// discarded) or propagated to the caller as-is.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status code, when a response was received.
    pub status: Option<u16>,
    /// Raw response body, when a response was received.
    pub body: Option<String>,
}

impl ApiError {
    /// An error with no associated HTTP response.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// An error classified from an HTTP response.
    pub fn with_status(
        kind: ErrorKind,
        message: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status: Some(status),
            body: Some(body.into()),
        }
    }

    /// Shorthand for the `InvalidResponse` kind.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Classify a non-success HTTP status code into an [`ApiError`].
///
/// Pure and total: never panics, always returns exactly one error. Rules
/// in precedence order: 429 → rate limited, 401/403 → auth, 5xx → server,
/// other 4xx → client, anything else → unclassified with the raw status
/// in the message.
pub fn classify_status(status: u16, body: &str) -> ApiError {
    match status {
        429 => ApiError::with_status(
            ErrorKind::RateLimited,
            "Rate limit exceeded. Please try again later.",
            status,
            body,
        ),
        401 | 403 => ApiError::with_status(
            ErrorKind::AuthFailed,
            "Authentication failed. Please check your API key.",
            status,
            body,
        ),
        500..=599 => ApiError::with_status(
            ErrorKind::ServerError,
            format!("Server error (HTTP {status}). Please try again later."),
            status,
            body,
        ),
        400..=499 => ApiError::with_status(
            ErrorKind::ClientError,
            format!("Client error (HTTP {status}): {body}"),
            status,
            body,
        ),
        _ => ApiError::with_status(
            ErrorKind::Unclassified,
            format!("HTTP {status} error: {body}"),
            status,
            body,
        ),
    }
}

/// Classify a transport failure that happened before any response was
/// received: timeouts map to `Timeout`, everything else to
/// `ConnectionFailed`.
pub fn classify_transport(err: &reqwest::Error, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::new(
            ErrorKind::Timeout,
            format!("Request timeout after {} seconds", timeout.as_secs()),
        )
    } else if err.is_connect() {
        ApiError::new(ErrorKind::ConnectionFailed, format!("Connection error: {err}"))
    } else {
        ApiError::new(ErrorKind::ConnectionFailed, format!("Request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classified() {
        let err = classify_status(429, "slow down");
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.body.as_deref(), Some("slow down"));
    }

    #[test]
    fn auth_failures_classified() {
        assert_eq!(classify_status(401, "").kind, ErrorKind::AuthFailed);
        assert_eq!(classify_status(403, "").kind, ErrorKind::AuthFailed);
    }

    #[test]
    fn all_5xx_are_server_errors() {
        for status in [500, 502, 503, 504, 599] {
            let err = classify_status(status, "");
            assert_eq!(err.kind, ErrorKind::ServerError, "status {status}");
            assert!(err.message.contains(&format!("HTTP {status}")));
        }
    }

    #[test]
    fn other_4xx_are_client_errors() {
        for status in [400, 404, 418, 422] {
            assert_eq!(classify_status(status, "").kind, ErrorKind::ClientError);
        }
    }

    #[test]
    fn unknown_status_is_unclassified_with_raw_code() {
        let err = classify_status(302, "moved");
        assert_eq!(err.kind, ErrorKind::Unclassified);
        assert!(err.message.contains("302"));
    }

    #[test]
    fn retryable_membership() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ServerError.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::ConnectionFailed.is_retryable());

        assert!(!ErrorKind::AuthFailed.is_retryable());
        assert!(!ErrorKind::ClientError.is_retryable());
        assert!(!ErrorKind::InvalidResponse.is_retryable());
        assert!(!ErrorKind::Unclassified.is_retryable());
    }

    #[test]
    fn display_prefixes_kind_label() {
        let err = classify_status(429, "");
        assert!(err.to_string().starts_with("[rate_limited]"));

        let err = ApiError::invalid_response("bad shape");
        assert_eq!(err.to_string(), "[invalid_response] bad shape");
    }

    #[tokio::test]
    async fn connection_refused_classified_as_connection_failed() {
        // Nothing listens on this port.
        let client = reqwest::Client::new();
        let err = client
            .get("http://127.0.0.1:9")
            .send()
            .await
            .expect_err("request should fail");
        let classified = classify_transport(&err, Duration::from_secs(30));
        assert_eq!(classified.kind, ErrorKind::ConnectionFailed);
    }
}
