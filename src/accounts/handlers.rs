use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Form, Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AccountListResponse, ChangePasswordRequest, LoginRequest, MessageResponse, OtpRequest,
        PageQuery, PublicAccount, RegisterRequest, ResetPasswordForm, TokenResponse,
        UpdateAccountRequest,
    },
    error::AccountError,
    services::{AccountChanges, NewAccount},
};
use crate::{auth::AuthUser, state::AppState};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/users", get(list_accounts))
        .route("/user/:id", get(get_account).delete(delete_account).put(update_account))
        .route("/requestOTP", post(request_otp))
        .route("/resetPassword", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/password", put(change_password))
}

/// Non-UUID ids cannot exist, so they read as "not found".
fn parse_id(raw: &str) -> Result<Uuid, AccountError> {
    Uuid::parse_str(raw).map_err(|_| AccountError::NotFound)
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicAccount>), AccountError> {
    let id = state
        .accounts
        .register(NewAccount {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;
    let account = state.accounts.get_by_id(id).await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AccountError> {
    let outcome = state
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            user_id: outcome.account_id,
            token: outcome.token,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<AccountListResponse>, AccountError> {
    let page = state.accounts.list(&q.cursor, q.limit).await?;
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicAccount>, AccountError> {
    let account = state.accounts.get_by_id(parse_id(&id)?).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state))]
pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AccountError> {
    state.accounts.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<PublicAccount>, AccountError> {
    let id = parse_id(&id)?;
    if caller != id {
        return Err(AccountError::Forbidden);
    }
    let account = state
        .accounts
        .update(
            id,
            AccountChanges {
                username: payload.username,
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(account_id): AuthUser,
) -> Result<Json<PublicAccount>, AccountError> {
    let account = state.accounts.get_by_id(account_id).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(account_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AccountError> {
    state
        .accounts
        .change_password(account_id, &payload.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AccountError> {
    state.accounts.request_otp(&payload.email).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("An OTP was sent to your email {}", payload.email.trim()),
        }),
    ))
}

#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn reset_password(
    State(state): State<AppState>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<(StatusCode, Json<MessageResponse>), AccountError> {
    state
        .accounts
        .reset_password(&form.email, &form.password, &form.otp)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Reset password successful".into(),
        }),
    ))
}
