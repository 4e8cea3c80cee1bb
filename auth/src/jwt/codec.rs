use std::str::FromStr;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;

use super::claims::Claims;
use super::claims::TokenKind;
use super::errors::Rejection;
use super::errors::TokenError;

/// Minimum secret length accepted for HMAC signing (256 bits).
pub const MIN_SECRET_LENGTH: usize = 32;

/// Longest lifetime accepted for any session token.
pub const MAX_TOKEN_TTL_DAYS: i64 = 365;

/// Signing algorithm and token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenSettings {
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenSettings {
    /// Parse an algorithm identifier such as `"HS256"`.
    ///
    /// Only HMAC algorithms are accepted since tokens are signed with a
    /// shared secret.
    ///
    /// # Errors
    /// * `Configuration` - Unknown or non-HMAC algorithm
    pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
        let algorithm = Algorithm::from_str(name)
            .map_err(|_| TokenError::Configuration(format!("unknown algorithm '{}'", name)))?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => Err(TokenError::Configuration(format!(
                "algorithm {:?} requires a key pair, only HS256/HS384/HS512 are supported",
                other
            ))),
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }
}

/// Issues and verifies signed session tokens.
///
/// Tokens are self-contained JWTs: validity depends only on the signature
/// and on the `exp` claim compared against the caller-supplied time.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    settings: TokenSettings,
}

impl TokenCodec {
    /// Create a new codec with a secret key.
    ///
    /// # Arguments
    /// * `secret` - Secret key for signing tokens
    /// * `settings` - Algorithm and lifetimes
    ///
    /// # Errors
    /// * `Configuration` - Secret shorter than 32 bytes, non-HMAC algorithm,
    ///   or a lifetime outside `(0, MAX_TOKEN_TTL_DAYS]`
    pub fn new(secret: &[u8], settings: TokenSettings) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::Configuration(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        if !matches!(
            settings.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::Configuration(format!(
                "unsupported algorithm {:?}",
                settings.algorithm
            )));
        }

        let max_ttl = Duration::days(MAX_TOKEN_TTL_DAYS);
        for ttl in [settings.access_ttl, settings.refresh_ttl] {
            if ttl <= Duration::zero() || ttl > max_ttl {
                return Err(TokenError::Configuration(format!(
                    "token lifetimes must be positive and at most {} days",
                    MAX_TOKEN_TTL_DAYS
                )));
            }
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            settings,
        })
    }

    /// Lifetime of tokens of the given kind.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.settings.access_ttl,
            TokenKind::Refresh => self.settings.refresh_ttl,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Sign a new token for `subject`.
    ///
    /// # Arguments
    /// * `subject` - Subject claim (account identifier)
    /// * `kind` - Access or refresh
    /// * `now` - Issue time; expiry is `now + ttl(kind)`
    ///
    /// # Returns
    /// Compact JWT string
    ///
    /// # Errors
    /// * `EncodingFailed` - Expiry out of range or token encoding failed
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(subject, kind, now, self.ttl(kind))?;
        let header = Header::new(self.settings.algorithm);

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| TokenError::EncodingFailed(e.to_string()))
    }

    /// Verify a token's signature and expiry.
    ///
    /// # Arguments
    /// * `token` - JWT string
    /// * `now` - Verification time
    ///
    /// # Returns
    /// Decoded claims
    ///
    /// # Errors
    /// * `InvalidToken` - Signature mismatch, malformed encoding, or `now >= exp`
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.settings.algorithm);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let rejection = match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        Rejection::BadSignature
                    }
                    ErrorKind::ExpiredSignature => Rejection::Expired,
                    _ => Rejection::Malformed,
                };
                tracing::debug!(reason = ?rejection, error = %e, "Session token rejected");
                TokenError::InvalidToken(rejection)
            })?;

        if claims.is_expired(now) {
            tracing::debug!(reason = ?Rejection::Expired, exp = claims.exp, "Session token rejected");
            return Err(TokenError::InvalidToken(Rejection::Expired));
        }

        Ok(claims)
    }

    /// Verify a token and return its subject.
    ///
    /// # Errors
    /// * `InvalidToken` - See [`TokenCodec::verify`]
    /// * `MissingSubject` - Token is authentic but carries no subject
    pub fn extract_subject(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = self.verify(token, now)?;

        claims.subject().map(str::to_string).ok_or_else(|| {
            tracing::error!("Authentic session token without 'sub' claim");
            TokenError::MissingSubject
        })
    }
}
