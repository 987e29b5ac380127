use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    error::StoreError,
    repo_types::{Account, AccountPage},
};
use crate::cursor::{self, Cursor};

/// Durable account storage.
///
/// Futures returned by every method are cancel-safe to drop: dropping one
/// aborts the in-flight query and returns the connection to the pool.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Accounts strictly after `cursor` in `(created_at, id)` order.
    async fn fetch_page(&self, cursor: Option<Cursor>, limit: i64)
        -> Result<AccountPage, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError>;
    /// `Duplicate` when the email is already taken.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;
    /// Replaces username, email, hash and `updated_at` of an existing row.
    async fn update(&self, account: &Account) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Builds the page cursor from the last row, only for full pages.
pub(crate) fn next_cursor(accounts: &[Account], limit: i64) -> Option<String> {
    if limit <= 0 || accounts.len() as i64 != limit {
        return None;
    }
    accounts
        .last()
        .map(|a| cursor::encode_with_key(a.created_at, a.id))
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: i64,
    ) -> Result<AccountPage, StoreError> {
        let accounts = match cursor {
            None => {
                sqlx::query_as::<_, Account>(
                    r#"
                    SELECT id, username, email, password_hash, created_at, updated_at
                    FROM accounts
                    ORDER BY created_at, id
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            Some(Cursor { created_at, id: None }) => {
                sqlx::query_as::<_, Account>(
                    r#"
                    SELECT id, username, email, password_hash, created_at, updated_at
                    FROM accounts
                    WHERE created_at > $1
                    ORDER BY created_at, id
                    LIMIT $2
                    "#,
                )
                .bind(created_at)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            Some(Cursor { created_at, id: Some(id) }) => {
                sqlx::query_as::<_, Account>(
                    r#"
                    SELECT id, username, email, password_hash, created_at, updated_at
                    FROM accounts
                    WHERE (created_at, id) > ($1, $2)
                    ORDER BY created_at, id
                    LIMIT $3
                    "#,
                )
                .bind(created_at)
                .bind(id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
        };

        let next_cursor = next_cursor(&accounts, limit);
        Ok(AccountPage {
            accounts,
            next_cursor,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(account)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(account)
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, username, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE accounts
               SET username = $1, email = $2, password_hash = $3, updated_at = $4
             WHERE id = $5
            "#,
        )
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.updated_at)
        .bind(account.id)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
