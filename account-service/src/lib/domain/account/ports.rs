use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use crate::account::errors::AccountError;
use crate::account::errors::AuthError;
use crate::account::errors::EmailDispatchError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::PasswordHash;
use crate::account::models::PasswordResetEmail;
use crate::account::models::RegisterAccountCommand;
use crate::account::models::ResetAcknowledgement;
use crate::account::models::ResetToken;
use crate::account::models::SessionTokens;
use crate::account::models::StoredResetToken;

/// Port for authentication operations.
///
/// Every time-dependent operation receives `now` from the caller so expiry
/// logic never reads the wall clock itself.
#[async_trait]
pub trait AuthServicePort: Send + Sync + 'static {
    /// Register a new active account.
    ///
    /// # Errors
    /// * `EmailAlreadyExists` / `UsernameAlreadyExists` - Identifier taken
    /// * `DatabaseError` - Database operation failed
    async fn register(&self, command: RegisterAccountCommand) -> Result<Account, AuthError>;

    /// Check an identifier and password.
    ///
    /// # Returns
    /// The account when the password matches and the account is active,
    /// `None` for unknown identifiers, wrong passwords and inactive accounts
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<Account>, AuthError>;

    /// Issue an access and refresh token pair for `subject_id`.
    async fn issue_session(
        &self,
        subject_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<SessionTokens, AuthError>;

    /// Authenticate and issue a session.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown identifier or wrong password
    /// * `InactiveAccount` - Correct password on a deactivated account
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionTokens, AuthError>;

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    /// * `InvalidToken` - Bad, expired, wrong-kind or superseded refresh token,
    ///   or the account no longer exists
    /// * `InactiveAccount` - Account was deactivated
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError>;

    /// Resolve an access token to the account it was issued for.
    ///
    /// # Errors
    /// * `InvalidToken` - Bad, expired or wrong-kind token, or unknown subject
    /// * `MissingSubject` - Authentic token without a subject
    /// * `InactiveAccount` - Account was deactivated
    async fn current_account(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError>;

    /// Issue a reset token for the account behind `identifier`, if any.
    async fn start_password_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetToken>, AuthError>;

    /// Start a reset and mail the link, answering identically either way.
    ///
    /// Unknown identifiers, persistence failures and delivery failures all
    /// yield the generic acknowledgement; failures are only logged.
    async fn request_password_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetAcknowledgement, AuthError>;

    /// Check a reset token without redeeming it.
    ///
    /// # Errors
    /// * `InvalidOrExpiredToken` - Token is unknown, superseded, used or expired
    async fn verify_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<(), AuthError>;

    /// Redeem a reset token and set a new password.
    ///
    /// # Errors
    /// * `InvalidOrExpiredToken` - Token is unknown, superseded, used or expired
    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>;
}

/// Persistence operations for the account aggregate.
///
/// Each method touches a single record and is atomic with respect to it.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Persist a new account.
    ///
    /// # Errors
    /// * `UsernameAlreadyExists` - Username is already taken
    /// * `EmailAlreadyExists` - Email is already registered
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, account: Account) -> Result<Account, AccountError>;

    /// Retrieve account by identifier.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountError>;

    /// Retrieve account by email address.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<Account>, AccountError>;

    /// Retrieve the account whose stored reset-token digest equals `digest`.
    ///
    /// Expiry is not checked here.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_reset_token(&self, digest: &str) -> Result<Option<Account>, AccountError>;

    /// Overwrite the account's reset-token digest and expiry in one write.
    ///
    /// # Errors
    /// * `NotFound` - Account does not exist
    /// * `DatabaseError` - Database operation failed
    async fn store_reset_token(
        &self,
        id: &AccountId,
        token: &StoredResetToken,
    ) -> Result<(), AccountError>;

    /// Replace the password hash and clear the reset token, but only while
    /// `digest` is still the stored, unexpired reset token at `now`.
    ///
    /// Also stamps `password_changed_at = now`.
    ///
    /// # Returns
    /// `true` when the record was updated, `false` when the condition no
    /// longer held and nothing was written
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn redeem_reset_token(
        &self,
        id: &AccountId,
        digest: &str,
        new_password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, AccountError>;
}

/// Outbound email delivery.
#[async_trait]
pub trait EmailDispatcher: Send + Sync + 'static {
    /// Deliver a password reset link.
    ///
    /// # Errors
    /// * `Unavailable` - Transport could not be reached
    /// * `Rejected` - Transport refused the message
    async fn send_password_reset(&self, email: &PasswordResetEmail)
        -> Result<(), EmailDispatchError>;
}
