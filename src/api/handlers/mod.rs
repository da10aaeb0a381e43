//! Route handlers and the shared request plumbing they use: header-based
//! authentication, request validation, and cache TTLs.

pub mod health;
pub mod me;
pub mod projects;
pub mod sessions;
pub mod totp;
pub mod users;

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use axum::http::HeaderMap;
use regex::Regex;
use url::Url;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

use super::error::ApiError;
use super::state::AppState;
use crate::auth::Session;

pub const USERS_CACHE_TTL: Duration = Duration::from_secs(60);
pub const USER_CACHE_TTL: Duration = Duration::from_secs(120);
pub const PROJECTS_CACHE_TTL: Duration = Duration::from_secs(120);

/// Raw `Authorization` header value. The header carries either the service
/// secret or a bearer session token, with no scheme prefix.
pub fn authorization(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::AuthorizationMissing)
}

/// Gate for routes only the trusted frontend gateway may call.
pub fn require_service_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if state.secret_matches(presented) {
        Ok(())
    } else {
        Err(ApiError::AuthorizationInvalid)
    }
}

/// Resolve the caller's session from the `Authorization` header.
pub async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let token = authorization(headers)?;
    Ok(state.sessions.resolve(token).await?)
}

/// Lightweight email sanity check before persisting data.
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn valid_password(password: &str) -> bool {
    (8..=32).contains(&password.len())
}

pub fn valid_name(name: &str) -> bool {
    (4..=64).contains(&name.chars().count())
}

pub fn valid_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

pub fn valid_ip(ip: &str) -> bool {
    IpAddr::from_str(ip).is_ok()
}
