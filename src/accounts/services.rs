//! Account business logic.
//!
//! `AccountService` is the only place that combines the account store, the
//! OTP store and the auth collaborators. Every public method runs under the
//! configured operation ceiling; when it elapses the in-flight store call is
//! dropped and `AccountError::Timeout` is returned.

use std::{future::Future, sync::Arc, time::Duration};

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    error::{AccountError, StoreError},
    otp_store::{otp_key, OtpStore},
    repo::AccountStore,
    repo_types::{Account, AccountPage},
};
use crate::{
    auth::{password, JwtKeys},
    cursor,
    mailer::OtpMailer,
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;
const OTP_LOW: u32 = 1000;
const OTP_HIGH_EXCLUSIVE: u32 = 10_000;

/// Source of OTP digits.
pub trait CodeSource: Send + Sync {
    /// Uniform integer in `low..high_exclusive`.
    fn uniform_int(&self, low: u32, high_exclusive: u32) -> u32;
}

pub struct ThreadRngCodes;

impl CodeSource for ThreadRngCodes {
    fn uniform_int(&self, low: u32, high_exclusive: u32) -> u32 {
        rand::thread_rng().gen_range(low..high_exclusive)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub op_timeout: Duration,
    pub otp_ttl: Duration,
}

pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Partial update. `password` is always plaintext and is hashed when present.
#[derive(Default)]
pub struct AccountChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account_id: Uuid,
    pub token: String,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    otps: Arc<dyn OtpStore>,
    mailer: Arc<dyn OtpMailer>,
    codes: Arc<dyn CodeSource>,
    keys: JwtKeys,
    settings: ServiceSettings,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_email(email: &str) -> Result<(), AccountError> {
    if !is_valid_email(email) {
        return Err(AccountError::bad_input("Invalid email"));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::bad_input(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Recovery reports a missing account as `EmailNotFound`.
fn unknown_email(e: AccountError) -> AccountError {
    match e {
        AccountError::NotFound => AccountError::EmailNotFound,
        other => other,
    }
}

fn check_username(username: &str) -> Result<(), AccountError> {
    if username.trim().is_empty() {
        return Err(AccountError::bad_input("Username is required"));
    }
    Ok(())
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        otps: Arc<dyn OtpStore>,
        mailer: Arc<dyn OtpMailer>,
        codes: Arc<dyn CodeSource>,
        keys: JwtKeys,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            accounts,
            otps,
            mailer,
            codes,
            keys,
            settings,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, AccountError>>,
    {
        match tokio::time::timeout(self.settings.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout = ?self.settings.op_timeout, "operation timed out");
                Err(AccountError::Timeout)
            }
        }
    }

    /// Full page of sanitized accounts after `cursor` (empty = from start).
    #[instrument(skip(self))]
    pub async fn list(&self, cursor: &str, limit: Option<i64>) -> Result<AccountPage, AccountError> {
        let boundary =
            cursor::decode(cursor).map_err(|e| AccountError::bad_input(e.to_string()))?;
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);

        self.bounded("list", async {
            let page = self.accounts.fetch_page(boundary, limit).await?;
            Ok::<_, AccountError>(AccountPage {
                accounts: page.accounts.into_iter().map(Account::sanitized).collect(),
                next_cursor: page.next_cursor,
            })
        })
        .await
    }

    /// Account with the password hash cleared.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Account, AccountError> {
        self.bounded("get_by_id", async {
            let account = self.accounts.get_by_id(id).await?;
            Ok::<_, AccountError>(account.sanitized())
        })
        .await
    }

    /// Full account including the password hash, for credential checks.
    #[instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        self.bounded("get_by_email", async {
            Ok::<_, AccountError>(self.accounts.get_by_email(&email).await?)
        })
        .await
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: NewAccount) -> Result<Uuid, AccountError> {
        let email = normalize_email(&input.email);
        let username = input.username.trim().to_string();
        check_username(&username)?;
        check_email(&email)?;
        check_password(&input.password)?;

        self.bounded("register", async {
            match self.accounts.get_by_email(&email).await {
                Ok(_) => {
                    warn!(email = %email, "email already registered");
                    return Err(AccountError::EmailAlreadyExists);
                }
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }

            let now = OffsetDateTime::now_utc();
            let account = Account {
                id: Uuid::new_v4(),
                username,
                email,
                password_hash: password::hash(&input.password)?,
                created_at: now,
                updated_at: now,
            };
            // Duplicate from the unique constraint maps to EmailAlreadyExists.
            self.accounts.insert(&account).await?;

            info!(account_id = %account.id, email = %account.email, "account registered");
            Ok::<_, AccountError>(account.id)
        })
        .await
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: AccountChanges) -> Result<Account, AccountError> {
        let AccountChanges {
            username,
            email,
            password: new_password,
        } = changes;
        let username = username.map(|u| u.trim().to_string());
        let email = email.map(|e| normalize_email(&e));
        if let Some(u) = &username {
            check_username(u)?;
        }
        if let Some(e) = &email {
            check_email(e)?;
        }
        if let Some(p) = &new_password {
            check_password(p)?;
        }

        self.bounded("update", async {
            let mut account = self.accounts.get_by_id(id).await?;
            if let Some(u) = username {
                account.username = u;
            }
            if let Some(e) = email {
                account.email = e;
            }
            if let Some(p) = new_password {
                account.password_hash = password::hash(&p)?;
            }
            account.updated_at = OffsetDateTime::now_utc();
            self.accounts.update(&account).await?;

            info!(account_id = %id, "account updated");
            Ok::<_, AccountError>(account.sanitized())
        })
        .await
    }

    /// Hash and persist a new plaintext password.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, id: Uuid, new_password: &str) -> Result<(), AccountError> {
        check_password(new_password)?;
        self.bounded("change_password", async {
            let mut account = self.accounts.get_by_id(id).await?;
            account.password_hash = password::hash(new_password)?;
            account.updated_at = OffsetDateTime::now_utc();
            self.accounts.update(&account).await?;
            info!(account_id = %id, "password changed");
            Ok::<_, AccountError>(())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AccountError> {
        self.bounded("delete", async {
            self.accounts.delete(id).await?;
            info!(account_id = %id, "account deleted");
            Ok::<_, AccountError>(())
        })
        .await
    }

    /// Unknown email and wrong password are reported identically.
    #[instrument(skip(self, plain_password))]
    pub async fn login(&self, email: &str, plain_password: &str) -> Result<LoginOutcome, AccountError> {
        let email = normalize_email(email);
        self.bounded("login", async {
            let account = match self.accounts.get_by_email(&email).await {
                Ok(a) => a,
                Err(StoreError::NotFound) => {
                    warn!(email = %email, "login unknown email");
                    return Err(AccountError::EmailOrPasswordMismatch);
                }
                Err(e) => return Err(e.into()),
            };

            if !password::verify(plain_password, &account.password_hash)? {
                warn!(email = %email, account_id = %account.id, "login invalid password");
                return Err(AccountError::EmailOrPasswordMismatch);
            }

            let token = self.keys.issue(account.id)?;
            info!(account_id = %account.id, "account logged in");
            Ok::<_, AccountError>(LoginOutcome {
                account_id: account.id,
                token,
            })
        })
        .await
    }

    /// Issue a fresh code for `email`, replacing any outstanding one.
    #[instrument(skip(self))]
    pub async fn request_otp(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        self.bounded("request_otp", async {
            self.get_by_email(&email).await.map_err(unknown_email)?;

            let code = self
                .codes
                .uniform_int(OTP_LOW, OTP_HIGH_EXCLUSIVE)
                .to_string();
            // Stored before sending, so a delivered code is always redeemable.
            self.otps
                .set(&otp_key(&email), &code, self.settings.otp_ttl)
                .await?;
            self.mailer.send_otp(&email, &code).await?;

            info!(email = %email, ttl = ?self.settings.otp_ttl, "otp issued");
            Ok::<_, AccountError>(())
        })
        .await
    }

    /// Redeem `otp` for `email` and set `new_password`. A code redeems once.
    #[instrument(skip(self, new_password, otp))]
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        otp: &str,
    ) -> Result<(), AccountError> {
        let email = normalize_email(email);
        check_password(new_password)?;

        self.bounded("reset_password", async {
            let account = self.get_by_email(&email).await.map_err(unknown_email)?;

            let otp = otp.trim();
            if otp.is_empty() || !self.otps.consume(&otp_key(&email), otp).await? {
                warn!(email = %email, "otp wrong or expired");
                return Err(AccountError::OtpInvalidOrExpired);
            }

            // The code is already spent here; a failure leaves the old password.
            if let Err(e) = self.change_password(account.id, new_password).await {
                warn!(
                    account_id = %account.id,
                    error = %e,
                    "otp consumed but password not stored"
                );
                return Err(e);
            }

            info!(account_id = %account.id, "password reset");
            Ok::<_, AccountError>(())
        })
        .await
    }
}
