//! LLM error types

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Classification of a failed LLM call
///
/// The kind is what the retry executor looks at; the message carried by
/// [`LlmError`] is only for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 503 (and other gateway-style unavailability)
    ServiceUnavailable,
    /// HTTP 500 and other server-side failures
    ServerError,
    /// The request or the run deadline timed out
    Timeout,
    /// Malformed or empty response body
    InvalidResponse,
    /// Auth failure, malformed request; never retried
    Fatal,
    /// The caller cancelled the run
    Cancelled,
}

impl ErrorKind {
    /// Check if an error of this kind is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServiceUnavailable | Self::ServerError | Self::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::InvalidResponse => "invalid_response",
            Self::Fatal => "fatal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during a single LLM invocation
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Fatal API error: {0}")]
    Fatal(String),

    #[error("Cancelled")]
    Cancelled,
}

impl LlmError {
    /// Get the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::RateLimited(_) => ErrorKind::RateLimited,
            LlmError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            LlmError::ServerError { .. } => ErrorKind::ServerError,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            LlmError::Fatal(_) => ErrorKind::Fatal,
            LlmError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Map a non-success HTTP status and its body to an error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        debug!(status, body_len = message.len(), "LlmError::from_status: called");
        match status {
            429 => LlmError::RateLimited(message),
            408 => LlmError::Timeout(format!("HTTP 408: {}", message)),
            502..=504 => LlmError::ServiceUnavailable(format!("HTTP {}: {}", status, message)),
            500..=599 => LlmError::ServerError { status, message },
            _ => LlmError::Fatal(format!("HTTP {}: {}", status, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::RateLimited("slow down".to_string()).is_retryable());
        assert!(LlmError::ServiceUnavailable("overloaded".to_string()).is_retryable());
        assert!(
            LlmError::ServerError {
                status: 500,
                message: "Server error".to_string()
            }
            .is_retryable()
        );
        assert!(LlmError::Timeout("30s".to_string()).is_retryable());

        assert!(!LlmError::InvalidResponse("Bad JSON".to_string()).is_retryable());
        assert!(!LlmError::Fatal("bad key".to_string()).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(LlmError::from_status(429, "").kind(), ErrorKind::RateLimited);
        assert_eq!(LlmError::from_status(503, "").kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(LlmError::from_status(502, "").kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(LlmError::from_status(500, "").kind(), ErrorKind::ServerError);
        assert_eq!(LlmError::from_status(529, "").kind(), ErrorKind::ServerError);
        assert_eq!(LlmError::from_status(408, "").kind(), ErrorKind::Timeout);
        assert_eq!(LlmError::from_status(401, "").kind(), ErrorKind::Fatal);
        assert_eq!(LlmError::from_status(400, "").kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"service_unavailable\"");
        assert_eq!(ErrorKind::InvalidResponse.to_string(), "invalid_response");
    }
}
