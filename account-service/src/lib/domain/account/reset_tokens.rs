use std::sync::Arc;

use auth::SecureRandom;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::account::errors::AccountError;
use crate::account::models::Account;
use crate::account::models::PasswordHash;
use crate::account::models::ResetToken;
use crate::account::models::StoredResetToken;
use crate::account::ports::AccountRepository;

/// Default lifetime of a password reset token.
pub const DEFAULT_RESET_TTL_HOURS: i64 = 24;

/// Longest reset token lifetime accepted from configuration.
pub const MAX_RESET_TTL_HOURS: i64 = 7 * 24;

/// Single-use password reset tokens bound to account records.
///
/// At most one token is live per account: issuing a new one overwrites the
/// stored digest, which permanently invalidates any earlier token.
pub struct ResetTokenStore<AR>
where
    AR: AccountRepository,
{
    repository: Arc<AR>,
    random: Arc<dyn SecureRandom>,
    ttl: Duration,
}

impl<AR> ResetTokenStore<AR>
where
    AR: AccountRepository,
{
    /// Create a new reset token store.
    ///
    /// # Arguments
    /// * `repository` - Account persistence
    /// * `random` - Secure random source for token generation
    /// * `ttl` - Token lifetime
    pub fn new(repository: Arc<AR>, random: Arc<dyn SecureRandom>, ttl: Duration) -> Self {
        Self {
            repository,
            random,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a token for `account` and persist its digest.
    ///
    /// # Returns
    /// Plaintext token, valid until `now + ttl`
    ///
    /// # Errors
    /// * `ExpiryOutOfRange` - `now + ttl` is not representable; nothing was stored
    /// * `NotFound` - Account vanished
    /// * `DatabaseError` - Database operation failed; nothing was stored
    pub async fn issue(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<ResetToken, AccountError> {
        let token = ResetToken::new(auth::random::generate_token(self.random.as_ref()));
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(AccountError::ExpiryOutOfRange)?;
        let stored = StoredResetToken {
            digest: token.digest(),
            expires_at,
        };

        self.repository
            .store_reset_token(&account.id, &stored)
            .await?;

        tracing::info!(
            account_id = %account.id,
            expires_at = %stored.expires_at,
            "Password reset token issued"
        );

        Ok(token)
    }

    /// Generate and digest a token that is never stored.
    ///
    /// Mirrors the work of [`ResetTokenStore::issue`] up to the write, for
    /// requests that must not reveal whether an account exists.
    pub fn discard_token(&self) {
        let token = ResetToken::new(auth::random::generate_token(self.random.as_ref()));
        let _ = std::hint::black_box(token.digest());
    }

    /// Resolve a presented token to its account.
    ///
    /// # Returns
    /// The owning account while the token is the stored one and unexpired,
    /// `None` for unknown, superseded, used and expired tokens alike
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    pub async fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, AccountError> {
        if token.is_empty() {
            return Ok(None);
        }

        let digest = auth::random::token_digest(token);
        let account = self.repository.find_by_reset_token(&digest).await?;

        Ok(account.filter(|account| account.has_live_reset_token(&digest, now)))
    }

    /// Write `new_password_hash` and clear the reset token as one unit.
    ///
    /// Succeeds only while the token observed on `account` is still stored
    /// and unexpired, so a token re-issued or redeemed concurrently makes
    /// this a no-op.
    ///
    /// # Returns
    /// `true` when the password was changed and the token consumed
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed; nothing was written
    pub async fn consume(
        &self,
        account: &Account,
        new_password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, AccountError> {
        let Some(stored) = &account.reset_token else {
            return Ok(false);
        };

        let consumed = self
            .repository
            .redeem_reset_token(&account.id, &stored.digest, new_password_hash, now)
            .await?;

        if consumed {
            tracing::info!(account_id = %account.id, "Password reset token consumed");
        } else {
            tracing::warn!(
                account_id = %account.id,
                "Password reset token changed before it could be consumed"
            );
        }

        Ok(consumed)
    }
}
