//! TOTP enrollment lifecycle: disabled, pending setup, enabled.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::{require_session, valid_password};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::AppState;
use crate::auth::{password, totp};
use crate::cache;
use crate::store::users;

#[derive(ToSchema, Deserialize, Debug)]
pub struct SetupBody {
    password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/me/totp",
    responses(
        (status = 200, description = "Fresh shared secret and otpauth provisioning URL"),
        (status = 400, description = "Wrong password", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "totp"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn setup(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SetupBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if !valid_password(&body.password) {
        return Err(ApiError::MissingParameter("password"));
    }

    let user = users::get_by_id(&pool, &session.user_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::CredentialsInvalid)?;
    if !password::verify(&body.password, &user.password_hash)
        .map_err(|err| ApiError::FailedHash(format!("{err:#}")))?
    {
        return Err(ApiError::CredentialsInvalid);
    }

    let provisioned = totp::provision(&state.totp_issuer, &user.email)
        .map_err(|err| ApiError::FailedTotp(format!("{err:#}")))?;

    // Re-running setup replaces any pending secret and drops back to the
    // pending state until the new secret is confirmed.
    users::set_totp_secret(&pool, &session.user_id, Some(&provisioned.secret))
        .await
        .map_err(ApiError::sql)?;

    cache::invalidate(state.kv.as_ref(), &format!("user:{}", session.user_id)).await;

    Ok(Json(json!({
        "secret": provisioned.secret,
        "url": provisioned.url,
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me/totp/{code}",
    params(("code" = String, Path, description = "Six-digit TOTP code")),
    responses(
        (status = 200, description = "Probe result; a first valid code enables TOTP"),
        (status = 401, description = "Session missing or expired"),
        (status = 404, description = "No pending or enabled TOTP secret"),
    ),
    tag = "totp"
)]
#[instrument(skip(pool, state, headers))]
pub async fn confirm(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;

    let user = users::get_by_id(&pool, &session.user_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    let secret = user.totp_secret.ok_or(ApiError::NotFound)?;

    let valid =
        totp::verify(&secret, &code).map_err(|err| ApiError::FailedTotp(format!("{err:#}")))?;

    if enables_totp(valid, user.totp_enabled) {
        users::set_totp_enabled(&pool, &session.user_id, true)
            .await
            .map_err(ApiError::sql)?;
        cache::invalidate(state.kv.as_ref(), &format!("user:{}", session.user_id)).await;
        cache::invalidate(state.kv.as_ref(), "users").await;
    }

    Ok(Json(json!({ "valid": valid })))
}

/// A first valid probe flips the flag on; confirming again with another
/// valid code is an idempotent success that leaves the flag alone.
const fn enables_totp(valid: bool, already_enabled: bool) -> bool {
    valid && !already_enabled
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct DisableBody {
    password: String,
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me/totp",
    responses(
        (status = 204, description = "TOTP disabled, secret discarded"),
        (status = 400, description = "Wrong password", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "totp"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn disable(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DisableBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if !valid_password(&body.password) {
        return Err(ApiError::MissingParameter("password"));
    }

    let user = users::get_by_id(&pool, &session.user_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::CredentialsInvalid)?;
    if !password::verify(&body.password, &user.password_hash)
        .map_err(|err| ApiError::FailedHash(format!("{err:#}")))?
    {
        return Err(ApiError::CredentialsInvalid);
    }

    users::set_totp_secret(&pool, &session.user_id, None)
        .await
        .map_err(ApiError::sql)?;

    cache::invalidate(state.kv.as_ref(), &format!("user:{}", session.user_id)).await;
    cache::invalidate(state.kv.as_ref(), "users").await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use totp_rs::{Algorithm, Secret, TOTP};

    use super::*;

    fn current_code(secret_base32: &str) -> String {
        let secret = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some("atelier".to_string()),
            "someone@example.com".to_string(),
        )
        .unwrap();
        totp.generate_current().unwrap()
    }

    #[test]
    fn a_second_valid_code_is_an_idempotent_success() {
        let provisioned = totp::provision("atelier", "someone@example.com").unwrap();

        // First valid code enables.
        let valid = totp::verify(&provisioned.secret, &current_code(&provisioned.secret)).unwrap();
        assert!(valid);
        assert!(enables_totp(valid, false));

        // A second valid code still reports valid but leaves the flag alone.
        let valid = totp::verify(&provisioned.secret, &current_code(&provisioned.secret)).unwrap();
        assert!(valid);
        assert!(!enables_totp(valid, true));
    }

    #[test]
    fn invalid_codes_never_enable() {
        assert!(!enables_totp(false, false));
        assert!(!enables_totp(false, true));
    }
}
