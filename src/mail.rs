//! Outbound email: verification links and password resets.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send email: {0}")]
    Send(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// # Errors
    /// Returns an error if the relay host is invalid.
    pub fn new(host: &str, username: &str, password: &SecretString, from: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|err| MailError::Build(err.to_string()))?
            .credentials(Credentials::new(
                username.to_string(),
                password.expose_secret().to_string(),
            ))
            .build();
        Ok(Self {
            transport,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|err| MailError::Build(format!("{err}")))?)
            .to(to.parse().map_err(|err| MailError::Build(format!("{err}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|err| MailError::Build(err.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|err| MailError::Send(err.to_string()))?;
        Ok(())
    }
}

/// Logs instead of sending. Used when no SMTP relay is configured and in
/// tests.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(%to, %subject, "Email (log only): {body}");
        Ok(())
    }
}

/// Body for the email-verification message.
#[must_use]
pub fn verification_body(base_url: &str, token: &str) -> String {
    format!("Confirm your email address by visiting:\n\n{base_url}/{token}\n\nThe link expires in 30 minutes.")
}

/// Body for the password-reset message.
#[must_use]
pub fn reset_body(base_url: &str, token: &str) -> String {
    format!("Reset your password by visiting:\n\n{base_url}/{token}\n\nThe link expires in 30 minutes.")
}
