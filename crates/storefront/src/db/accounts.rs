//! Account repository for database operations.
//!
//! Accounts and their verification tokens live side by side; every write
//! that touches both runs in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pizzeria_core::{Email, UserId, VerificationId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{Account, AccountCredentials, EmailVerification, NewVerification};

/// Persistence for accounts and email verification tokens.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Look up an account and its password hash by (normalized) email.
    async fn find_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<AccountCredentials>, RepositoryError>;

    /// Look up an account by id.
    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, RepositoryError>;

    /// Create an unverified account and its first verification token.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_with_verification(
        &self,
        email: &Email,
        password_hash: &str,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError>;

    /// Drop any outstanding tokens for the account and store a new one.
    async fn replace_verification(
        &self,
        account: &Account,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Find a token record, expired or not.
    async fn find_verification(
        &self,
        token: &str,
    ) -> Result<Option<EmailVerification>, RepositoryError>;

    /// Delete the token and mark its account verified, both or neither.
    ///
    /// Returns `false` if the token was already consumed.
    async fn consume_verification(
        &self,
        verification: &EmailVerification,
    ) -> Result<bool, RepositoryError>;

    /// Delete tokens whose expiry has passed. Returns the number removed.
    async fn purge_expired_verifications(&self, now: DateTime<Utc>)
    -> Result<u64, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: UserId,
    email: String,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: row.id,
            email,
            verified: row.verified,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    account: AccountRow,
    password_hash: String,
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: VerificationId,
    user_id: UserId,
    email: String,
    token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for EmailVerification {
    type Error = RepositoryError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            email,
            token: row.token,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

/// `PostgreSQL` account storage.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new account repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<AccountCredentials>, RepositoryError> {
        let row: Option<CredentialsRow> = sqlx::query_as(
            r"
            SELECT id, email, verified, created_at, password_hash
            FROM storefront.account
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(AccountCredentials {
                account: Account::try_from(r.account)?,
                password_hash: r.password_hash,
            })
        })
        .transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, RepositoryError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r"
            SELECT id, email, verified, created_at
            FROM storefront.account
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn create_with_verification(
        &self,
        email: &Email,
        password_hash: &str,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: AccountRow = sqlx::query_as(
            r"
            INSERT INTO storefront.account (email, password_hash, verified, created_at)
            VALUES ($1, $2, FALSE, $3)
            RETURNING id, email, verified, created_at
            ",
        )
        .bind(email.as_str())
        .bind(password_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        let account = Account::try_from(row)?;

        sqlx::query(
            r"
            INSERT INTO storefront.email_verification (user_id, email, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(account.id)
        .bind(account.email.as_str())
        .bind(&verification.token)
        .bind(verification.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(account)
    }

    async fn replace_verification(
        &self,
        account: &Account,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM storefront.email_verification WHERE user_id = $1")
            .bind(account.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.email_verification (user_id, email, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(account.id)
        .bind(account.email.as_str())
        .bind(&verification.token)
        .bind(verification.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_verification(
        &self,
        token: &str,
    ) -> Result<Option<EmailVerification>, RepositoryError> {
        let row: Option<VerificationRow> = sqlx::query_as(
            r"
            SELECT id, user_id, email, token, expires_at, created_at
            FROM storefront.email_verification
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EmailVerification::try_from).transpose()
    }

    async fn consume_verification(
        &self,
        verification: &EmailVerification,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM storefront.email_verification WHERE id = $1")
            .bind(verification.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            // Lost a race with another redemption of the same token
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE storefront.account SET verified = TRUE WHERE id = $1")
            .bind(verification.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn purge_expired_verifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.email_verification WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
