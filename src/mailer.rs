//! Outbound OTP delivery.

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, instrument};

use crate::config::SmtpConfig;

const SUBJECT: &str = "[accounts] Forgot password";

#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("smtp relay")?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

fn otp_body(to: &str, code: &str) -> String {
    format!(
        "<h3>Hello {to}, your password reset code is <b>{code}</b>. \
         It expires in a few minutes; ignore this message if you did not ask for it.</h3>"
    )
}

#[async_trait]
impl OtpMailer for SmtpMailer {
    #[instrument(skip(self, code))]
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse::<Mailbox>().context("parse sender address")?)
            .to(to.parse::<Mailbox>().context("parse recipient address")?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(otp_body(to, code))
            .context("build otp message")?;
        self.transport
            .send(message)
            .await
            .context("smtp send")?;
        Ok(())
    }
}

/// Development fallback used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()> {
        info!(to = %to, code = %code, "smtp disabled; otp written to log");
        Ok(())
    }
}
