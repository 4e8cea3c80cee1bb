use std::sync::Arc;

use async_trait::async_trait;
use auth::Claims;
use auth::OsRandom;
use auth::PasswordHasher;
use auth::SecureRandom;
use auth::TokenCodec;
use auth::TokenKind;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::account::errors::AuthError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::PasswordHash;
use crate::account::models::PasswordResetEmail;
use crate::account::models::RegisterAccountCommand;
use crate::account::models::ResetAcknowledgement;
use crate::account::models::ResetToken;
use crate::account::models::SessionTokens;
use crate::account::ports::AccountRepository;
use crate::account::ports::AuthServicePort;
use crate::account::ports::EmailDispatcher;
use crate::account::reset_tokens::ResetTokenStore;

/// Password hashed once at startup so unknown identifiers cost the same
/// verification work as known ones.
const TIMING_DUMMY_PASSWORD: &str = "timing-equalization-dummy-password";

/// Reset flow settings.
#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub ttl: Duration,
    pub callback_base_url: String,
}

/// First whole second at or after `instant`.
fn ceil_to_second(instant: DateTime<Utc>) -> i64 {
    if instant.timestamp_subsec_nanos() > 0 {
        instant.timestamp() + 1
    } else {
        instant.timestamp()
    }
}

enum CredentialCheck {
    Valid(Account),
    Inactive,
    Rejected,
}

/// Authentication coordinator.
///
/// Composes password hashing, session token issuance and the reset token
/// store over an account repository. Holds no global state: everything it
/// uses is handed in at construction.
pub struct AuthCoordinator<AR, ED>
where
    AR: AccountRepository,
    ED: EmailDispatcher,
{
    repository: Arc<AR>,
    email_dispatcher: Arc<ED>,
    password_hasher: PasswordHasher,
    token_codec: Arc<TokenCodec>,
    reset_tokens: ResetTokenStore<AR>,
    callback_base_url: String,
    dummy_hash: String,
}

impl<AR, ED> AuthCoordinator<AR, ED>
where
    AR: AccountRepository,
    ED: EmailDispatcher,
{
    /// Create a new coordinator with injected dependencies.
    ///
    /// # Arguments
    /// * `repository` - Account persistence implementation
    /// * `email_dispatcher` - Outbound email implementation
    /// * `token_codec` - Configured session token codec
    /// * `settings` - Reset token lifetime and link base
    ///
    /// # Errors
    /// * `Internal` - The timing-equalization hash could not be computed
    pub fn new(
        repository: Arc<AR>,
        email_dispatcher: Arc<ED>,
        token_codec: Arc<TokenCodec>,
        settings: ResetSettings,
    ) -> Result<Self, AuthError> {
        Self::with_random_source(
            repository,
            email_dispatcher,
            token_codec,
            settings,
            Arc::new(OsRandom),
        )
    }

    /// Like [`AuthCoordinator::new`] with an explicit random source for
    /// reset tokens.
    pub fn with_random_source(
        repository: Arc<AR>,
        email_dispatcher: Arc<ED>,
        token_codec: Arc<TokenCodec>,
        settings: ResetSettings,
        random: Arc<dyn SecureRandom>,
    ) -> Result<Self, AuthError> {
        let password_hasher = PasswordHasher::new();
        let dummy_hash = password_hasher.hash(TIMING_DUMMY_PASSWORD).map_err(|e| {
            AuthError::Internal(format!("Failed to prepare timing-equalization hash: {}", e))
        })?;

        Ok(Self {
            reset_tokens: ResetTokenStore::new(Arc::clone(&repository), random, settings.ttl),
            repository,
            email_dispatcher,
            password_hasher,
            token_codec,
            callback_base_url: settings.callback_base_url,
            dummy_hash,
        })
    }

    pub fn token_codec(&self) -> &TokenCodec {
        &self.token_codec
    }

    async fn hash_password(&self, password: &str) -> Result<PasswordHash, AuthError> {
        let hasher = self.password_hasher;
        let password = password.to_string();

        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))??;

        Ok(PasswordHash::new(hash))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.password_hasher;
        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, AuthError> {
        match EmailAddress::new(identifier.to_string()) {
            Ok(email) => Ok(self.repository.find_by_email(&email).await?),
            Err(_) => Ok(None),
        }
    }

    async fn check_credentials(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<CredentialCheck, AuthError> {
        let Some(account) = self.find_by_identifier(identifier).await? else {
            self.verify_password(password, &self.dummy_hash).await?;
            tracing::info!("Login rejected: unknown identifier");
            return Ok(CredentialCheck::Rejected);
        };

        if !self
            .verify_password(password, account.password_hash.as_str())
            .await?
        {
            tracing::info!(account_id = %account.id, "Login rejected: password mismatch");
            return Ok(CredentialCheck::Rejected);
        }

        if !account.is_active {
            tracing::info!(account_id = %account.id, "Login rejected: account inactive");
            return Ok(CredentialCheck::Inactive);
        }

        Ok(CredentialCheck::Valid(account))
    }

    /// Verify `token`, require `kind`, and load the active account it names.
    async fn account_for_token(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<(Account, Claims), AuthError> {
        let claims = self.token_codec.verify(token, now)?;

        if claims.typ != kind {
            tracing::debug!(
                expected = kind.as_str(),
                actual = claims.typ.as_str(),
                "Session token of the wrong kind"
            );
            return Err(AuthError::InvalidToken);
        }

        let subject = claims.subject().ok_or(AuthError::MissingSubject)?;
        let account_id = AccountId::from_string(subject).map_err(|e| {
            tracing::error!(error = %e, "Session token subject is not an account id");
            AuthError::InvalidToken
        })?;

        let account = self
            .repository
            .find_by_id(&account_id)
            .await?
            .ok_or_else(|| {
                tracing::info!(account_id = %account_id, "Session token for unknown account");
                AuthError::InvalidToken
            })?;

        if !account.is_active {
            return Err(AuthError::InactiveAccount);
        }

        Ok((account, claims))
    }

    async fn issue_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Account, ResetToken)>, AuthError> {
        let Some(account) = self.find_by_identifier(identifier).await? else {
            self.reset_tokens.discard_token();
            tracing::info!("Password reset requested for unknown identifier");
            return Ok(None);
        };

        let token = self.reset_tokens.issue(&account, now).await?;
        Ok(Some((account, token)))
    }

    fn dispatch_reset_email(&self, email: PasswordResetEmail) {
        let dispatcher = Arc::clone(&self.email_dispatcher);

        tokio::spawn(async move {
            if let Err(e) = dispatcher.send_password_reset(&email).await {
                tracing::error!(
                    recipient = %email.recipient,
                    error = %e,
                    "Failed to dispatch password reset email"
                );
            }
        });
    }
}

#[async_trait]
impl<AR, ED> AuthServicePort for AuthCoordinator<AR, ED>
where
    AR: AccountRepository,
    ED: EmailDispatcher,
{
    async fn register(&self, command: RegisterAccountCommand) -> Result<Account, AuthError> {
        let password_hash = self.hash_password(&command.password).await?;

        let account = Account {
            id: AccountId::new(),
            email: command.email,
            username: command.username,
            password_hash,
            is_active: true,
            reset_token: None,
            password_changed_at: None,
            created_at: Utc::now(),
        };

        let created = self.repository.create(account).await?;
        tracing::info!(account_id = %created.id, "Account registered");

        Ok(created)
    }

    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<Account>, AuthError> {
        match self.check_credentials(identifier, password).await? {
            CredentialCheck::Valid(account) => Ok(Some(account)),
            CredentialCheck::Inactive | CredentialCheck::Rejected => Ok(None),
        }
    }

    async fn issue_session(
        &self,
        subject_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<SessionTokens, AuthError> {
        let subject = subject_id.to_string();
        let access_token = self.token_codec.issue(&subject, TokenKind::Access, now)?;
        let refresh_token = self.token_codec.issue(&subject, TokenKind::Refresh, now)?;

        Ok(SessionTokens::bearer(access_token, refresh_token))
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionTokens, AuthError> {
        match self.check_credentials(identifier, password).await? {
            CredentialCheck::Valid(account) => {
                let tokens = self.issue_session(&account.id, now).await?;
                tracing::info!(account_id = %account.id, "Session issued");
                Ok(tokens)
            }
            CredentialCheck::Inactive => Err(AuthError::InactiveAccount),
            CredentialCheck::Rejected => Err(AuthError::InvalidCredentials),
        }
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let (account, claims) = self
            .account_for_token(refresh_token, TokenKind::Refresh, now)
            .await?;

        // Refresh tokens minted before the last password change are void.
        // `iat` has whole-second precision, so a token from the same second
        // as the change counts as older.
        if let Some(changed_at) = account.password_changed_at {
            if claims.iat < ceil_to_second(changed_at) {
                tracing::info!(
                    account_id = %account.id,
                    "Refresh token predates password change"
                );
                return Err(AuthError::InvalidToken);
            }
        }

        let access_token =
            self.token_codec
                .issue(&account.id.to_string(), TokenKind::Access, now)?;
        Ok(access_token)
    }

    async fn current_account(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let (account, _) = self
            .account_for_token(access_token, TokenKind::Access, now)
            .await?;
        Ok(account)
    }

    async fn start_password_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetToken>, AuthError> {
        Ok(self
            .issue_reset(identifier, now)
            .await?
            .map(|(_, token)| token))
    }

    async fn request_password_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetAcknowledgement, AuthError> {
        match self.issue_reset(identifier, now).await {
            Ok(Some((account, token))) => self.dispatch_reset_email(PasswordResetEmail {
                recipient: account.email,
                reset_token: token,
                callback_base_url: self.callback_base_url.clone(),
            }),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to start password reset"),
        }

        Ok(ResetAcknowledgement::generic())
    }

    async fn verify_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        self.reset_tokens
            .verify(token, now)
            .await?
            .map(|_| ())
            .ok_or(AuthError::InvalidOrExpiredToken)
    }

    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let Some(account) = self.reset_tokens.verify(token, now).await? else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let new_hash = self.hash_password(new_password).await?;

        if !self.reset_tokens.consume(&account, &new_hash, now).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        tracing::info!(account_id = %account.id, "Password reset completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use auth::TokenSettings;
    use mockall::mock;
    use tokio::sync::mpsc;

    use super::*;
    use crate::account::errors::AccountError;
    use crate::account::errors::EmailDispatchError;
    use crate::account::models::StoredResetToken;
    use crate::account::models::Username;

    const SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";

    mock! {
        pub TestAccountRepository {}

        #[async_trait]
        impl AccountRepository for TestAccountRepository {
            async fn create(&self, account: Account) -> Result<Account, AccountError>;
            async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountError>;
            async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<Account>, AccountError>;
            async fn find_by_reset_token(&self, digest: &str) -> Result<Option<Account>, AccountError>;
            async fn store_reset_token(&self, id: &AccountId, token: &StoredResetToken) -> Result<(), AccountError>;
            async fn redeem_reset_token(
                &self,
                id: &AccountId,
                digest: &str,
                new_password_hash: &PasswordHash,
                now: DateTime<Utc>,
            ) -> Result<bool, AccountError>;
        }
    }

    /// Forwards every dispatched email to a channel.
    struct ChannelDispatcher {
        sender: mpsc::UnboundedSender<PasswordResetEmail>,
        fail: bool,
    }

    #[async_trait]
    impl EmailDispatcher for ChannelDispatcher {
        async fn send_password_reset(
            &self,
            email: &PasswordResetEmail,
        ) -> Result<(), EmailDispatchError> {
            let _ = self.sender.send(email.clone());
            if self.fail {
                Err(EmailDispatchError::Unavailable("smtp down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Counts how many tokens were drawn.
    #[derive(Default)]
    struct CountingRandom {
        draws: AtomicUsize,
    }

    impl SecureRandom for CountingRandom {
        fn fill_bytes(&self, dest: &mut [u8]) {
            self.draws.fetch_add(1, Ordering::SeqCst);
            OsRandom.fill_bytes(dest);
        }
    }

    type TestCoordinator = AuthCoordinator<MockTestAccountRepository, ChannelDispatcher>;

    fn build_coordinator_with_random(
        repository: MockTestAccountRepository,
        fail_delivery: bool,
        random: Arc<dyn SecureRandom>,
    ) -> (TestCoordinator, mpsc::UnboundedReceiver<PasswordResetEmail>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let codec = TokenCodec::new(SECRET, TokenSettings::default()).unwrap();

        let coordinator = AuthCoordinator::with_random_source(
            Arc::new(repository),
            Arc::new(ChannelDispatcher {
                sender,
                fail: fail_delivery,
            }),
            Arc::new(codec),
            ResetSettings {
                ttl: Duration::hours(24),
                callback_base_url: "https://app.example.com".to_string(),
            },
            random,
        )
        .expect("Failed to build coordinator");
        (coordinator, receiver)
    }

    fn build_coordinator(
        repository: MockTestAccountRepository,
        fail_delivery: bool,
    ) -> (TestCoordinator, mpsc::UnboundedReceiver<PasswordResetEmail>) {
        build_coordinator_with_random(repository, fail_delivery, Arc::new(OsRandom))
    }

    fn account(password: &str, is_active: bool) -> Account {
        Account {
            id: AccountId::new(),
            email: EmailAddress::new("a@x.com".to_string()).unwrap(),
            username: Username::new("alice".to_string()).unwrap(),
            password_hash: PasswordHash::new(PasswordHasher::new().hash(password).unwrap()),
            is_active,
            reset_token: None,
            password_changed_at: None,
            created_at: Utc::now(),
        }
    }

    fn returning_account(repository: &mut MockTestAccountRepository, account: &Account) {
        let by_email = account.clone();
        repository
            .expect_find_by_email()
            .returning(move |_| Ok(Some(by_email.clone())));
        let by_id = account.clone();
        repository
            .expect_find_by_id()
            .returning(move |_| Ok(Some(by_id.clone())));
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let mut repository = MockTestAccountRepository::new();
        repository
            .expect_create()
            .withf(|account| {
                account.email.as_str() == "a@x.com"
                    && account.password_hash.as_str().starts_with("$argon2")
                    && account.is_active
                    && account.reset_token.is_none()
            })
            .times(1)
            .returning(Ok);

        let (coordinator, _) = build_coordinator(repository, false);
        let command = RegisterAccountCommand::new(
            EmailAddress::new("a@x.com".to_string()).unwrap(),
            Username::new("alice".to_string()).unwrap(),
            "Secret123!".to_string(),
        );

        let account = coordinator.register(command).await.unwrap();
        assert!(PasswordHasher::new().verify("Secret123!", account.password_hash.as_str()));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let mut repository = MockTestAccountRepository::new();
        repository
            .expect_create()
            .times(1)
            .returning(|account| Err(AccountError::EmailAlreadyExists(account.email.to_string())));

        let (coordinator, _) = build_coordinator(repository, false);
        let command = RegisterAccountCommand::new(
            EmailAddress::new("a@x.com".to_string()).unwrap(),
            Username::new("alice".to_string()).unwrap(),
            "Secret123!".to_string(),
        );

        assert!(matches!(
            coordinator.register(command).await,
            Err(AuthError::Account(AccountError::EmailAlreadyExists(_)))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);

        let (coordinator, _) = build_coordinator(repository, false);
        let result = coordinator.authenticate("a@x.com", "Secret123!").await.unwrap();

        assert_eq!(result.map(|a| a.id), Some(account.id));
    }

    #[tokio::test]
    async fn test_authenticate_rejections_are_none() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        let known = account.clone();
        repository.expect_find_by_email().returning(move |email| {
            if email.as_str() == "a@x.com" {
                Ok(Some(known.clone()))
            } else {
                Ok(None)
            }
        });

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(coordinator.authenticate("a@x.com", "wrong").await.unwrap().is_none());
        assert!(coordinator
            .authenticate("unknown@x.com", "Secret123!")
            .await
            .unwrap()
            .is_none());
        assert!(coordinator
            .authenticate("not an email", "Secret123!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_authenticate_inactive_is_none() {
        let account = account("Secret123!", false);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(coordinator
            .authenticate("a@x.com", "Secret123!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_login_error_surface() {
        let active = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &active);
        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator.login("a@x.com", "wrong", Utc::now()).await,
            Err(AuthError::InvalidCredentials)
        ));

        let inactive = account("Secret123!", false);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &inactive);
        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator.login("a@x.com", "Secret123!", Utc::now()).await,
            Err(AuthError::InactiveAccount)
        ));
        // Wrong password on an inactive account stays generic.
        assert!(matches!(
            coordinator.login("a@x.com", "wrong", Utc::now()).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_database_error_propagates() {
        let mut repository = MockTestAccountRepository::new();
        repository
            .expect_find_by_email()
            .returning(|_| Err(AccountError::DatabaseError("connection reset".to_string())));

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator.login("a@x.com", "Secret123!", Utc::now()).await,
            Err(AuthError::Account(AccountError::DatabaseError(_)))
        ));
    }

    #[tokio::test]
    async fn test_issue_session_pair() {
        let (coordinator, _) = build_coordinator(MockTestAccountRepository::new(), false);
        let id = AccountId::new();
        let now = Utc::now();

        let tokens = coordinator.issue_session(&id, now).await.unwrap();
        let codec = coordinator.token_codec();

        let access = codec.verify(&tokens.access_token, now).unwrap();
        let refresh = codec.verify(&tokens.refresh_token, now).unwrap();
        assert_eq!(access.subject(), Some(id.to_string().as_str()));
        assert_eq!(refresh.subject(), Some(id.to_string().as_str()));
        assert_eq!(access.typ, TokenKind::Access);
        assert_eq!(refresh.typ, TokenKind::Refresh);
        assert!(refresh.exp > access.exp);
        assert_eq!(tokens.token_type, "bearer");
    }

    #[tokio::test]
    async fn test_current_account_requires_access_token() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        let (coordinator, _) = build_coordinator(repository, false);
        let now = Utc::now();

        let tokens = coordinator.issue_session(&account.id, now).await.unwrap();

        let current = coordinator
            .current_account(&tokens.access_token, now)
            .await
            .unwrap();
        assert_eq!(current.id, account.id);

        assert!(matches!(
            coordinator.current_account(&tokens.refresh_token, now).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            coordinator
                .current_account(&tokens.access_token, now + Duration::minutes(16))
                .await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_current_account_unknown_subject() {
        let mut repository = MockTestAccountRepository::new();
        repository.expect_find_by_id().returning(|_| Ok(None));
        let (coordinator, _) = build_coordinator(repository, false);
        let now = Utc::now();

        let tokens = coordinator
            .issue_session(&AccountId::new(), now)
            .await
            .unwrap();

        assert!(matches!(
            coordinator.current_account(&tokens.access_token, now).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        let (coordinator, _) = build_coordinator(repository, false);
        let now = Utc::now();
        let tokens = coordinator.issue_session(&account.id, now).await.unwrap();

        let later = now + Duration::hours(1);
        let access = coordinator
            .refresh_access_token(&tokens.refresh_token, later)
            .await
            .unwrap();
        let claims = coordinator.token_codec().verify(&access, later).unwrap();
        assert_eq!(claims.typ, TokenKind::Access);

        assert!(matches!(
            coordinator
                .refresh_access_token(&tokens.access_token, now)
                .await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_void_after_password_change() {
        let mut account = account("Secret123!", true);
        let issued_at = Utc::now() - Duration::hours(2);
        account.password_changed_at = Some(issued_at + Duration::hours(1));

        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        let (coordinator, _) = build_coordinator(repository, false);

        let tokens = coordinator
            .issue_session(&account.id, issued_at)
            .await
            .unwrap();

        assert!(matches!(
            coordinator
                .refresh_access_token(&tokens.refresh_token, Utc::now())
                .await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_start_password_reset_unknown_identifier() {
        let mut repository = MockTestAccountRepository::new();
        repository.expect_find_by_email().returning(|_| Ok(None));
        repository.expect_store_reset_token().times(0);

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(coordinator
            .start_password_reset("unknown@x.com", Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_start_password_reset_persistence_failure() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        repository
            .expect_store_reset_token()
            .times(1)
            .returning(|_, _| Err(AccountError::DatabaseError("disk full".to_string())));

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator.start_password_reset("a@x.com", Utc::now()).await,
            Err(AuthError::Account(AccountError::DatabaseError(_)))
        ));
    }

    #[tokio::test]
    async fn test_request_password_reset_survives_delivery_failure() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        repository
            .expect_store_reset_token()
            .times(1)
            .returning(|_, _| Ok(()));

        let (coordinator, mut outbox) = build_coordinator(repository, true);

        let ack = coordinator
            .request_password_reset("a@x.com", Utc::now())
            .await
            .unwrap();
        assert_eq!(ack, ResetAcknowledgement::generic());

        let email = outbox.recv().await.expect("Email was not dispatched");
        assert_eq!(email.recipient, account.email);
        assert!(email
            .reset_link()
            .starts_with("https://app.example.com/reset-password?token="));
    }

    #[tokio::test]
    async fn test_complete_password_reset_unknown_token() {
        let mut repository = MockTestAccountRepository::new();
        repository.expect_find_by_reset_token().returning(|_| Ok(None));
        repository.expect_redeem_reset_token().times(0);

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator
                .complete_password_reset("bogus", "NewSecret1!", Utc::now())
                .await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_complete_password_reset_lost_race() {
        let now = Utc::now();
        let token = ResetToken::new("presented-token".to_string());
        let mut account = account("Secret123!", true);
        account.reset_token = Some(StoredResetToken {
            digest: token.digest(),
            expires_at: now + Duration::hours(1),
        });

        let mut repository = MockTestAccountRepository::new();
        let stored = account.clone();
        repository
            .expect_find_by_reset_token()
            .returning(move |_| Ok(Some(stored.clone())));
        repository
            .expect_redeem_reset_token()
            .times(1)
            .returning(|_, _, _, _| Ok(false));

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(matches!(
            coordinator
                .complete_password_reset(token.as_str(), "NewSecret1!", now)
                .await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_verify_reset_token() {
        let now = Utc::now();
        let token = ResetToken::new("presented-token".to_string());
        let mut account = account("Secret123!", true);
        account.reset_token = Some(StoredResetToken {
            digest: token.digest(),
            expires_at: now + Duration::hours(1),
        });

        let mut repository = MockTestAccountRepository::new();
        let stored = account.clone();
        repository
            .expect_find_by_reset_token()
            .returning(move |_| Ok(Some(stored.clone())));

        let (coordinator, _) = build_coordinator(repository, false);

        assert!(coordinator.verify_reset_token(token.as_str(), now).await.is_ok());
        assert!(matches!(
            coordinator
                .verify_reset_token(token.as_str(), now + Duration::hours(2))
                .await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_dummy_hash_is_a_real_hash() {
        let (coordinator, _) = build_coordinator(MockTestAccountRepository::new(), false);

        assert!(coordinator.dummy_hash.starts_with("$argon2id$"));
        assert!(PasswordHasher::new().verify(TIMING_DUMMY_PASSWORD, &coordinator.dummy_hash));
    }

    #[tokio::test]
    async fn test_refresh_token_from_same_second_as_password_change() {
        let second = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let login_at = second + Duration::milliseconds(100);
        let changed_at = second + Duration::milliseconds(900);

        let mut account = account("Secret123!", true);
        account.password_changed_at = Some(changed_at);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        let (coordinator, _) = build_coordinator(repository, false);

        let stale = coordinator.issue_session(&account.id, login_at).await.unwrap();
        assert!(matches!(
            coordinator
                .refresh_access_token(&stale.refresh_token, second + Duration::minutes(1))
                .await,
            Err(AuthError::InvalidToken)
        ));

        let fresh = coordinator
            .issue_session(&account.id, second + Duration::seconds(1))
            .await
            .unwrap();
        assert!(coordinator
            .refresh_access_token(&fresh.refresh_token, second + Duration::minutes(1))
            .await
            .is_ok());
    }

    #[test]
    fn test_ceil_to_second() {
        let second = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        assert_eq!(ceil_to_second(second), 1_700_000_000);
        assert_eq!(
            ceil_to_second(second + Duration::nanoseconds(1)),
            1_700_000_001
        );
        assert_eq!(
            ceil_to_second(second + Duration::milliseconds(999)),
            1_700_000_001
        );
    }

    #[tokio::test]
    async fn test_request_password_reset_hides_persistence_failure() {
        let account = account("Secret123!", true);
        let mut repository = MockTestAccountRepository::new();
        returning_account(&mut repository, &account);
        repository
            .expect_store_reset_token()
            .times(1)
            .returning(|_, _| Err(AccountError::DatabaseError("disk full".to_string())));

        let (coordinator, mut outbox) = build_coordinator(repository, false);

        let ack = coordinator
            .request_password_reset("a@x.com", Utc::now())
            .await
            .unwrap();

        assert_eq!(ack, ResetAcknowledgement::generic());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_identifier_still_draws_a_token() {
        let mut repository = MockTestAccountRepository::new();
        repository.expect_find_by_email().returning(|_| Ok(None));
        repository.expect_store_reset_token().times(0);
        let random = Arc::new(CountingRandom::default());

        let (coordinator, _) = build_coordinator_with_random(
            repository,
            false,
            Arc::clone(&random) as Arc<dyn SecureRandom>,
        );

        let ack = coordinator
            .request_password_reset("unknown@x.com", Utc::now())
            .await
            .unwrap();

        assert_eq!(ack, ResetAcknowledgement::generic());
        assert_eq!(random.draws.load(Ordering::SeqCst), 1);
    }
}
