use thiserror::Error;

/// Why a token was rejected.
///
/// Kept for server-side logging only: every reason renders the same
/// message, so callers cannot tell an expired token from a forged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Expired,
    BadSignature,
    Malformed,
}

/// Error type for session token operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token configuration: {0}")]
    Configuration(String),

    #[error("Failed to encode token: {0}")]
    EncodingFailed(String),

    #[error("Invalid or expired token")]
    InvalidToken(Rejection),

    #[error("Token has no subject")]
    MissingSubject,
}
