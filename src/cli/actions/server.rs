use crate::api;
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub struct SmtpArgs {
    pub host: String,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub kv_address: String,
    pub kv_password: SecretString,
    pub git_url: Url,
    pub git_owner: String,
    pub git_token: SecretString,
    pub git_template_owner: String,
    pub git_template: String,
    pub smtp: Option<SmtpArgs>,
    pub service_secret: SecretString,
    pub totp_issuer: String,
    pub session_ttl: Duration,
    pub remember_ttl: Duration,
    pub rps: u32,
}

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the server fails to start
pub async fn execute(args: Args) -> Result<()> {
    api::new(args).await
}
