//! Login, TOTP step-up, and session revocation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Extension, Path, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::{
    require_service_secret, require_session, valid_email, valid_ip, valid_password,
};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::AppState;
use crate::auth::{TicketPurpose, password, totp};
use crate::store::users;

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginBody {
    email: String,
    password: String,
    /// `true` selects the long-lived "remember me" lifetime.
    #[serde(default)]
    expire: bool,
    /// Overrides the observed peer address, for gateways that terminate the
    /// client connection.
    ip: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/sessions",
    responses(
        (status = 200, description = "Session token, or a step-up challenge id when TOTP is enabled"),
        (status = 400, description = "Unknown email or wrong password", body = [ErrorBody]),
        (status = 401, description = "Service secret missing or wrong"),
    ),
    tag = "sessions"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn login(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_service_secret(&state, &headers)?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;

    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(ApiError::MissingParameter("email"));
    }
    if !valid_password(&body.password) {
        return Err(ApiError::MissingParameter("password"));
    }
    if let Some(ip) = &body.ip {
        if !valid_ip(ip) {
            return Err(ApiError::MissingParameter("ip"));
        }
    }

    let user = users::get_by_email(&pool, &email)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::CredentialsInvalid)?;
    if !password::verify(&body.password, &user.password_hash)
        .map_err(|err| ApiError::FailedHash(format!("{err:#}")))?
    {
        return Err(ApiError::CredentialsInvalid);
    }

    // With TOTP enabled the password alone never yields a session; the
    // client gets a short-lived challenge id to redeem with a code.
    if user.totp_enabled {
        let totp_id = state.tickets.create(TicketPurpose::TotpPending, &user.id).await?;
        return Ok(Json(json!({ "totp_id": totp_id })));
    }

    let ip = body.ip.unwrap_or_else(|| peer.ip().to_string());
    let token = state.sessions.issue(&user.id, &ip, body.expire).await?;
    Ok(Json(json!({ "token": token })))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct StepUpBody {
    totp_id: String,
    code: String,
    ip: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/sessions/totp",
    responses(
        (status = 200, description = "Session token, or valid:false when the code is wrong"),
        (status = 404, description = "Unknown or expired challenge"),
    ),
    tag = "sessions"
)]
#[instrument(skip(pool, state, payload))]
pub async fn step_up(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    payload: Result<Json<StepUpBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if let Some(ip) = &body.ip {
        if !valid_ip(ip) {
            return Err(ApiError::MissingParameter("ip"));
        }
    }

    // Peek first: a wrong code must not burn the challenge.
    let user_id = state
        .tickets
        .peek(TicketPurpose::TotpPending, &body.totp_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let user = users::get_by_id(&pool, &user_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    let secret = user
        .totp_secret
        .ok_or_else(|| ApiError::FailedTotp("challenge for account without TOTP".to_string()))?;

    if !totp::verify(&secret, &body.code).map_err(|err| ApiError::FailedTotp(format!("{err:#}")))? {
        return Ok(Json(json!({ "valid": false })));
    }

    state
        .tickets
        .delete(TicketPurpose::TotpPending, &body.totp_id)
        .await?;
    let ip = body.ip.unwrap_or_else(|| peer.ip().to_string());
    let token = state.sessions.issue(&user.id, &ip, false).await?;
    Ok(Json(json!({ "token": token })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/sessions",
    responses(
        (status = 200, description = "Source IPs of the caller's live sessions"),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "sessions"
)]
pub async fn list_ips(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let ips = state.sessions.ips_for_user(&session.user_id).await?;
    Ok(Json(ips))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RevokeAllBody {
    password: String,
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/sessions",
    responses(
        (status = 200, description = "All of the caller's sessions revoked"),
        (status = 400, description = "Wrong password", body = [ErrorBody]),
    ),
    tag = "sessions"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn revoke_all(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RevokeAllBody>, JsonRejection>,
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

    let deleted = state.sessions.revoke_all_for_user(&session.user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/sessions/{token}",
    params(("token" = String, Path, description = "Session token to revoke")),
    responses(
        (status = 200, description = "Whether a session was revoked"),
    ),
    tag = "sessions"
)]
pub async fn revoke_one(
    state: Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.sessions.revoke(&token).await?;
    Ok(Json(json!({ "success": revoked })))
}
