use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Account, AccountPage};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
}

/// Form body of `POST /resetPassword`.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub email: String,
    pub password: String,
    pub otp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub cursor: String,
    pub limit: Option<i64>,
}

/// Account as returned to clients: never carries the password.
#[derive(Debug, Serialize)]
pub struct PublicAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Account> for PublicAccount {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            username: a.username,
            email: a.email,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<PublicAccount>,
    pub next_cursor: Option<String>,
}

impl From<AccountPage> for AccountListResponse {
    fn from(page: AccountPage) -> Self {
        Self {
            accounts: page.accounts.into_iter().map(PublicAccount::from).collect(),
            next_cursor: page.next_cursor,
        }
    }
}
