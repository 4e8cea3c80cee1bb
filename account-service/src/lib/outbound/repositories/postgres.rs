use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::account::errors::AccountError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::PasswordHash;
use crate::account::models::StoredResetToken;
use crate::account::models::Username;
use crate::account::ports::AccountRepository;
use crate::config::DatabaseConfig;

const ACCOUNT_COLUMNS: &str = "id, email, username, password_hash, is_active, \
     reset_token_hash, reset_token_expires_at, password_changed_at, created_at";

/// Open a connection pool for the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, AccountError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

    tracing::info!(
        max_connections = config.max_connections,
        database = "postgresql",
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AccountError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

    tracing::info!(database = "postgresql", "Database migrations completed");
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    is_active: bool,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
    password_changed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AccountError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let reset_token = match (row.reset_token_hash, row.reset_token_expires_at) {
            (Some(digest), Some(expires_at)) => Some(StoredResetToken { digest, expires_at }),
            _ => None,
        };

        Ok(Account {
            id: AccountId(row.id),
            email: EmailAddress::new(row.email)?,
            username: Username::new(row.username)?,
            password_hash: PasswordHash::new(row.password_hash),
            is_active: row.is_active,
            reset_token,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
        })
    }
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Account>, AccountError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE {} = $1",
            ACCOUNT_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: Account) -> Result<Account, AccountError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, username, password_hash, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.id.0)
        .bind(account.email.as_str())
        .bind(account.username.as_str())
        .bind(account.password_hash.as_str())
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    if db_err.constraint() == Some("accounts_username_key") {
                        return AccountError::UsernameAlreadyExists(
                            account.username.as_str().to_string(),
                        );
                    }
                    if db_err.constraint() == Some("accounts_email_key") {
                        return AccountError::EmailAlreadyExists(
                            account.email.as_str().to_string(),
                        );
                    }
                }
            }
            AccountError::DatabaseError(e.to_string())
        })?;

        Ok(account)
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<Account>, AccountError> {
        self.fetch_one_by("email", email.as_str()).await
    }

    async fn find_by_reset_token(&self, digest: &str) -> Result<Option<Account>, AccountError> {
        self.fetch_one_by("reset_token_hash", digest).await
    }

    async fn store_reset_token(
        &self,
        id: &AccountId,
        token: &StoredResetToken,
    ) -> Result<(), AccountError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET reset_token_hash = $2, reset_token_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(&token.digest)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        id: &AccountId,
        digest: &str,
        new_password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, AccountError> {
        // Single conditional UPDATE: the row lock makes check and write atomic.
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $3,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL,
                password_changed_at = $4
            WHERE id = $1
              AND reset_token_hash = $2
              AND reset_token_expires_at > $4
            "#,
        )
        .bind(id.0)
        .bind(digest)
        .bind(new_password_hash.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
