//! TOTP provisioning and verification (RFC 6238, SHA-1, 6 digits, 30s step).

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

pub struct Provisioned {
    /// Base32-encoded shared secret, stored server-side until confirmed.
    pub secret: String,
    /// otpauth:// URL for the user's authenticator app.
    pub url: String,
}

fn build(secret: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|err| anyhow!("failed to build TOTP: {err}"))
}

/// Generate a fresh shared secret and its otpauth URL.
pub fn provision(issuer: &str, account: &str) -> Result<Provisioned> {
    let secret = Secret::generate_secret();
    let totp = build(
        secret
            .to_bytes()
            .map_err(|err| anyhow!("failed to decode TOTP secret: {err}"))?,
        issuer,
        account,
    )?;
    Ok(Provisioned {
        secret: secret.to_encoded().to_string(),
        url: totp.get_url(),
    })
}

/// Check a user-supplied code against a stored base32 secret, allowing one
/// step of clock skew.
pub fn verify(secret_base32: &str, code: &str) -> Result<bool> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| anyhow!("failed to decode TOTP secret: {err}"))?;
    // Issuer and account label do not affect code verification.
    let totp = build(secret, "atelier", "account")?;
    totp.check_current(code)
        .map_err(|err| anyhow!("failed to check TOTP code: {err}"))
}
