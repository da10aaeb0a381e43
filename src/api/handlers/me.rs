//! Routes operating on the authenticated account.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::users::Profile;
use super::{USER_CACHE_TTL, require_session, valid_email, valid_password, valid_url};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::AppState;
use crate::auth::{TicketPurpose, password};
use crate::cache;
use crate::mail::verification_body;
use crate::store::users::{self, EmailWrite};

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Caller's profile", body = Profile),
        (status = 401, description = "Session missing or expired"),
        (status = 404, description = "Account no longer exists"),
    ),
    tag = "me"
)]
pub async fn get_me(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let key = format!("user:{}", session.user_id);
    let profile: Profile = cache::read_through(state.kv.as_ref(), &key, USER_CACHE_TTL, || async {
        let user = users::get_by_id(&pool, &session.user_id)
            .await
            .map_err(ApiError::sql)?
            .ok_or(ApiError::NotFound)?;
        Ok::<_, ApiError>(Profile::from(user))
    })
    .await?;
    Ok(Json(profile))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ChangeEmailBody {
    email: String,
    /// Frontend base URL the re-verification link is built from.
    url: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me/email",
    responses(
        (status = 204, description = "Email replaced, re-verification mail sent"),
        (status = 400, description = "Email already taken", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "me"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn change_email(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChangeEmailBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;

    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(ApiError::MissingParameter("email"));
    }
    if !valid_url(&body.url) {
        return Err(ApiError::MissingParameter("url"));
    }

    if users::get_by_email(&pool, &email)
        .await
        .map_err(ApiError::sql)?
        .is_some()
    {
        return Err(ApiError::EmailTaken);
    }

    let token = state
        .tickets
        .create(TicketPurpose::VerifyEmail, &session.user_id)
        .await?;
    state
        .mailer
        .send(&email, "Verify Email", &verification_body(&body.url, &token))
        .await?;

    // The new address starts unverified.
    match users::set_email(&pool, &session.user_id, &email)
        .await
        .map_err(ApiError::sql)?
    {
        EmailWrite::Done => {}
        EmailWrite::EmailTaken => return Err(ApiError::EmailTaken),
    }

    cache::invalidate(state.kv.as_ref(), &format!("user:{}", session.user_id)).await;
    cache::invalidate(state.kv.as_ref(), "users").await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    old_password: String,
    new_password: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me/password",
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Wrong current password", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "me"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn change_password(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if !valid_password(&body.old_password) || !valid_password(&body.new_password) {
        return Err(ApiError::MissingParameter("password"));
    }

    let user = users::get_by_id(&pool, &session.user_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::CredentialsInvalid)?;
    if !password::verify(&body.old_password, &user.password_hash)
        .map_err(|err| ApiError::FailedHash(format!("{err:#}")))?
    {
        return Err(ApiError::CredentialsInvalid);
    }

    let hash =
        password::hash(&body.new_password).map_err(|err| ApiError::FailedHash(format!("{err:#}")))?;
    users::set_password_hash(&pool, &session.user_id, &hash)
        .await
        .map_err(ApiError::sql)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct DeleteAccountBody {
    password: String,
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    responses(
        (status = 204, description = "Account and sessions deleted"),
        (status = 400, description = "Wrong password", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "me"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn delete_account(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DeleteAccountBody>, JsonRejection>,
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

    state.sessions.revoke_all_for_user(&session.user_id).await?;
    users::delete(&pool, &session.user_id)
        .await
        .map_err(ApiError::sql)?;

    cache::invalidate(state.kv.as_ref(), &format!("user:{}", session.user_id)).await;
    cache::invalidate(state.kv.as_ref(), &format!("projects:{}", session.user_id)).await;
    cache::invalidate(state.kv.as_ref(), "users").await;

    Ok(StatusCode::NO_CONTENT)
}
