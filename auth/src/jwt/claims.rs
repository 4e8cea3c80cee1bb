use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::errors::TokenError;

/// Session token flavor.
///
/// Both flavors share the same claim layout and differ only in lifetime and
/// in which operations accept them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claim set carried by every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (account identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Token flavor
    pub typ: TokenKind,
}

impl Claims {
    /// Build claims for `subject` issued at `now` and valid for `ttl`.
    ///
    /// # Errors
    /// * `EncodingFailed` - `now + ttl` is not a representable instant
    pub fn new(
        subject: impl ToString,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, TokenError> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            TokenError::EncodingFailed("token expiry is out of range".to_string())
        })?;

        Ok(Self {
            sub: Some(subject.to_string()),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            typ: kind,
        })
    }

    /// Subject claim, if present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().filter(|s| !s.is_empty())
    }

    /// Check if token is expired at `now`.
    ///
    /// A token is valid strictly before its `exp` second.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Issue time as a timestamp, `None` if out of range.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}
