use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use crate::account::errors::AccountIdError;
use crate::account::errors::EmailError;
use crate::account::errors::UsernameError;

/// Account aggregate entity.
///
/// The user record the authentication core reads credentials from and
/// writes reset-token state to.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub email: EmailAddress,
    pub username: Username,
    pub password_hash: PasswordHash,
    pub is_active: bool,
    pub reset_token: Option<StoredResetToken>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether `digest` names this account's outstanding reset token at `now`.
    ///
    /// The digest comparison runs in constant time.
    pub fn has_live_reset_token(&self, digest: &str, now: DateTime<Utc>) -> bool {
        match &self.reset_token {
            Some(stored) => {
                !stored.digest.is_empty()
                    && auth::random::constant_time_eq(stored.digest.as_bytes(), digest.as_bytes())
                    && now < stored.expires_at
            }
            None => false,
        }
    }
}

/// Account unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random account ID.
    ///
    /// # Returns
    /// AccountId with random UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an account ID from string.
    ///
    /// # Arguments
    /// * `s` - UUID string to parse
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, AccountIdError> {
        Uuid::parse_str(s)
            .map(AccountId)
            .map_err(|e| AccountIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username value type
///
/// Ensures username is 3-32 characters and contains only alphanumeric, underscore, and hyphen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 32;

    /// Create a new valid username.
    ///
    /// # Errors
    /// * `TooShort` - Username shorter than 3 characters
    /// * `TooLong` - Username longer than 32 characters
    /// * `InvalidCharacters` - Contains non-alphanumeric characters (except _ and -)
    pub fn new(username: String) -> Result<Self, UsernameError> {
        let username = Self::with_valid_length(username)?;
        let username = Self::with_valid_chars(username)?;
        Ok(Self(username))
    }

    fn with_valid_length(username: String) -> Result<String, UsernameError> {
        let length = username.chars().count();
        if length < Self::MIN_LENGTH {
            Err(UsernameError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            })
        } else if length > Self::MAX_LENGTH {
            Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            })
        } else {
            Ok(username)
        }
    }

    fn with_valid_chars(username: String) -> Result<String, UsernameError> {
        if username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            Ok(username)
        } else {
            Err(UsernameError::InvalidCharacters)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type, the login identifier.
///
/// Validated with an RFC 5322 parser and stored lowercased so lookups are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: String) -> Result<Self, EmailError> {
        let email = email.trim().to_lowercase();
        email_address::EmailAddress::from_str(&email)
            .map(|_| EmailAddress(email))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stored password hash (PHC string).
///
/// Deliberately has no `Display`; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Reset-token state persisted on the account record.
///
/// Digest and expiry always travel together: either both are stored or
/// neither is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResetToken {
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Plaintext reset token handed to the account owner.
#[derive(Clone, PartialEq, Eq)]
pub struct ResetToken(String);

impl ResetToken {
    pub fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest under which the token is stored.
    pub fn digest(&self) -> String {
        auth::random::token_digest(&self.0)
    }
}

impl fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetToken(<redacted>)")
    }
}

/// Access and refresh token pair returned on login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

impl SessionTokens {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer",
        }
    }
}

/// Response to a password reset request.
///
/// Identical whether or not the account exists and whether or not the
/// email was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetAcknowledgement {
    pub message: &'static str,
}

impl ResetAcknowledgement {
    pub const fn generic() -> Self {
        Self {
            message: "If an account exists for this address, a password reset link has been sent.",
        }
    }
}

/// Outgoing password reset message.
#[derive(Clone)]
pub struct PasswordResetEmail {
    pub recipient: EmailAddress,
    pub reset_token: ResetToken,
    pub callback_base_url: String,
}

impl PasswordResetEmail {
    /// Link the recipient follows to choose a new password.
    pub fn reset_link(&self) -> String {
        format!(
            "{}/reset-password?token={}",
            self.callback_base_url.trim_end_matches('/'),
            self.reset_token.as_str()
        )
    }
}

impl fmt::Debug for PasswordResetEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResetEmail")
            .field("recipient", &self.recipient)
            .field("callback_base_url", &self.callback_base_url)
            .finish_non_exhaustive()
    }
}

/// Command to register a new account with domain types
#[derive(Debug)]
pub struct RegisterAccountCommand {
    pub email: EmailAddress,
    pub username: Username,
    pub password: String,
}

impl RegisterAccountCommand {
    /// Construct a new register command.
    ///
    /// # Arguments
    /// * `email` - Validated email address
    /// * `username` - Validated username
    /// * `password` - Plain text password (will be hashed by the service)
    pub fn new(email: EmailAddress, username: Username, password: String) -> Self {
        Self {
            email,
            username,
            password,
        }
    }
}
