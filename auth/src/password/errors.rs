use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password contains characters that cannot be hashed")]
    InvalidEncoding,

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
}
