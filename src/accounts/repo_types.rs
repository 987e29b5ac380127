use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account row in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String, // unique, normalized to lowercase
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed in JSON
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// Copy of the account with the password hash cleared.
    pub fn sanitized(mut self) -> Self {
        self.password_hash.clear();
        self
    }
}

/// One page of accounts in keyset order.
#[derive(Debug, Clone)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    /// Present only when the page came back full.
    pub next_cursor: Option<String>,
}
