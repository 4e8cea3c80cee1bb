use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::account::errors::AccountError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::PasswordHash;
use crate::account::models::StoredResetToken;
use crate::account::ports::AccountRepository;

/// Process-local account store.
///
/// Every mutation runs under the write lock, so each one is atomic with
/// respect to the record it touches.
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Flip the active flag of an account.
    pub async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;
        account.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create(&self, account: Account) -> Result<Account, AccountError> {
        let mut accounts = self.accounts.write().await;

        if accounts.values().any(|a| a.email == account.email) {
            return Err(AccountError::EmailAlreadyExists(
                account.email.as_str().to_string(),
            ));
        }
        if accounts.values().any(|a| a.username == account.username) {
            return Err(AccountError::UsernameAlreadyExists(
                account.username.as_str().to_string(),
            ));
        }

        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<Account>, AccountError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| &a.email == email)
            .cloned())
    }

    async fn find_by_reset_token(&self, digest: &str) -> Result<Option<Account>, AccountError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| {
                a.reset_token
                    .as_ref()
                    .is_some_and(|stored| stored.digest == digest)
            })
            .cloned())
    }

    async fn store_reset_token(
        &self,
        id: &AccountId,
        token: &StoredResetToken,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;
        account.reset_token = Some(token.clone());
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        id: &AccountId,
        digest: &str,
        new_password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, AccountError> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(id) else {
            return Ok(false);
        };

        if !account.has_live_reset_token(digest, now) {
            return Ok(false);
        }

        account.password_hash = new_password_hash.clone();
        account.reset_token = None;
        account.password_changed_at = Some(now);
        Ok(true)
    }
}
