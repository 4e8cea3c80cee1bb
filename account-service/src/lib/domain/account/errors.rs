use thiserror::Error;

/// Error for AccountId parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("Invalid UUID format: {0}")]
    InvalidFormat(String),
}

/// Error for Username validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username too short: minimum {min} characters, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("Username too long: maximum {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error(
        "Username contains invalid characters (only alphanumeric, underscore, and hyphen allowed)"
    )]
    InvalidCharacters,
}

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error for email dispatch operations
#[derive(Debug, Clone, Error)]
pub enum EmailDispatchError {
    #[error("Email transport unavailable: {0}")]
    Unavailable(String),

    #[error("Email delivery rejected: {0}")]
    Rejected(String),
}

/// Account record and persistence errors
#[derive(Debug, Clone, Error)]
pub enum AccountError {
    // Value object validation errors (automatically converted via #[from])
    #[error("Invalid account ID: {0}")]
    InvalidAccountId(#[from] AccountIdError),

    #[error("Invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Password error: {0}")]
    Password(#[from] auth::PasswordError),

    // Domain-level errors
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Username already exists: {0}")]
    UsernameAlreadyExists(String),

    #[error("Email already exists: {0}")]
    EmailAlreadyExists(String),

    #[error("Reset token expiry out of range")]
    ExpiryOutOfRange,

    // Infrastructure errors
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Errors surfaced by the authentication coordinator.
///
/// Credential and token failures are deliberately coarse: the caller learns
/// that something failed, never which check failed.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is inactive")]
    InactiveAccount,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Token has no subject")]
    MissingSubject,

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<auth::TokenError> for AuthError {
    fn from(err: auth::TokenError) -> Self {
        match err {
            auth::TokenError::InvalidToken(_) => AuthError::InvalidToken,
            auth::TokenError::MissingSubject => AuthError::MissingSubject,
            auth::TokenError::Configuration(msg) | auth::TokenError::EncodingFailed(msg) => {
                AuthError::Internal(msg)
            }
        }
    }
}

impl From<auth::PasswordError> for AuthError {
    fn from(err: auth::PasswordError) -> Self {
        AuthError::Account(AccountError::Password(err))
    }
}
