use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub jwt: JwtConfig,
    /// `None` routes OTP codes to the log instead of SMTP.
    pub smtp: Option<SmtpConfig>,
    /// Ceiling for every account-service operation.
    pub context_timeout_ms: u64,
    pub otp_ttl_secs: u64,
    pub app_host: String,
    pub app_port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accounts".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accounts-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 15),
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => {
                let username = std::env::var("SMTP_USER").context("SMTP_USER")?;
                Some(SmtpConfig {
                    host,
                    port: env_parse("SMTP_PORT", 587),
                    password: std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD")?,
                    from: std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone()),
                    username,
                })
            }
            Err(_) => None,
        };
        Ok(Self {
            database_url,
            redis_url,
            jwt,
            smtp,
            context_timeout_ms: env_parse("CONTEXT_TIMEOUT_MS", 2_000),
            otp_ttl_secs: env_parse("OTP_TTL_SECS", 5 * 60),
            app_host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            app_port: env_parse("APP_PORT", 8080),
        })
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.app_host, self.app_port)
            .parse()
            .context("APP_HOST/APP_PORT")
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
