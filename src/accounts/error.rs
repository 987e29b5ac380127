use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failures reported by account and OTP store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate,
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(anyhow::Error::new(e))
    }
}

/// Error taxonomy of the account service.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Your requested item is not found")]
    NotFound,
    #[error("Email already exists")]
    EmailAlreadyExists,
    #[error("{0}")]
    BadInput(String),
    #[error("Email or password not match")]
    EmailOrPasswordMismatch,
    #[error("Email not exists")]
    EmailNotFound,
    #[error("OTP wrong or expired")]
    OtpInvalidOrExpired,
    #[error("Not allowed to modify another account")]
    Forbidden,
    #[error("Operation timed out")]
    Timeout,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn bad_input(msg: impl Into<String>) -> Self {
        AccountError::BadInput(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::NotFound | AccountError::EmailNotFound => StatusCode::NOT_FOUND,
            AccountError::EmailAlreadyExists => StatusCode::CONFLICT,
            AccountError::BadInput(_) | AccountError::OtpInvalidOrExpired => {
                StatusCode::BAD_REQUEST
            }
            AccountError::EmailOrPasswordMismatch => StatusCode::UNAUTHORIZED,
            AccountError::Forbidden => StatusCode::FORBIDDEN,
            AccountError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AccountError::NotFound,
            StoreError::Duplicate => AccountError::EmailAlreadyExists,
            StoreError::Backend(inner) => AccountError::Internal(inner),
        }
    }
}

impl From<crate::auth::password::PasswordError> for AccountError {
    fn from(e: crate::auth::password::PasswordError) -> Self {
        AccountError::Internal(anyhow::Error::new(e))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AccountError::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
