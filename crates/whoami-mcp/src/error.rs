//! Error types for the WhoAmI MCP server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

/// Errors from the HTTP client layer (calls to the identity provider).
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status from the identity provider
    #[error("Unexpected status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Malformed URL in configuration or discovery
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Classify a reqwest error, separating timeouts from other transport failures.
    #[must_use]
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Http(err)
        }
    }

    /// Create a status error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code if the identity provider answered with an error status.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classification of a failed token verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationErrorCode {
    /// The identity provider's answer did not have the identity-record shape.
    InvalidToken,
    /// Any other failure: transport, timeout, non-success status.
    TokenVerificationFailed,
}

impl VerificationErrorCode {
    /// Wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::TokenVerificationFailed => "token_verification_failed",
        }
    }
}

impl std::fmt::Display for VerificationErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a [`TokenVerifier`](crate::auth::TokenVerifier).
#[derive(thiserror::Error, Debug)]
pub enum VerificationError {
    /// Userinfo response could not be parsed into an identity record.
    #[error("Invalid token: {0}")]
    InvalidToken(#[source] serde_json::Error),

    /// Verification failed for any other reason.
    #[error("Token verification failed: {0}")]
    TokenVerificationFailed(#[source] ClientError),
}

impl VerificationError {
    /// The error classification.
    #[must_use]
    pub const fn code(&self) -> VerificationErrorCode {
        match self {
            Self::InvalidToken(_) => VerificationErrorCode::InvalidToken,
            Self::TokenVerificationFailed(_) => VerificationErrorCode::TokenVerificationFailed,
        }
    }
}

impl From<ClientError> for VerificationError {
    fn from(err: ClientError) -> Self {
        Self::TokenVerificationFailed(err)
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert to a user-friendly error message for MCP response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for token verification.
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_error_codes() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert_eq!(
            VerificationError::InvalidToken(parse_err).code(),
            VerificationErrorCode::InvalidToken
        );

        let err: VerificationError = ClientError::status(401, "Unauthorized").into();
        assert_eq!(err.code(), VerificationErrorCode::TokenVerificationFailed);
        assert_eq!(err.code().as_str(), "token_verification_failed");
    }

    #[test]
    fn test_client_error_status_code() {
        assert_eq!(ClientError::status(503, "down").status_code(), Some(503));
        assert_eq!(ClientError::Timeout(Duration::from_secs(1)).status_code(), None);
    }

    #[test]
    fn test_verification_error_keeps_cause() {
        use std::error::Error as _;

        let err = VerificationError::from(ClientError::status(401, "expired"));
        let source = err.source().expect("cause attached");
        assert!(source.to_string().contains("401"));
    }

    #[test]
    fn test_tool_error_user_message() {
        let err = ToolError::validation("arguments", "must be an object");
        assert!(err.to_user_message().contains("arguments"));
        assert!(err.to_user_message().contains("must be an object"));
    }
}
