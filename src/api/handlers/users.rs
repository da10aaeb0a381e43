//! Account registration, public listing, email verification, and password
//! reset flows.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::{USERS_CACHE_TTL, require_service_secret, valid_email, valid_password, valid_url};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::AppState;
use crate::auth::{TicketPurpose, password};
use crate::cache;
use crate::mail::{reset_body, verification_body};
use crate::store::users::{self, EmailWrite, User};

/// Public view of an account. Never carries the password hash or TOTP
/// secret.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub verified: bool,
    pub totp_enabled: bool,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            verified: user.verified,
            totp_enabled: user.totp_enabled,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterBody {
    email: String,
    password: String,
    /// Frontend base URL the verification link is built from.
    url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Account created, verification email sent"),
        (status = 400, description = "Validation failure or email already taken", body = [ErrorBody]),
        (status = 401, description = "Service secret missing or wrong"),
    ),
    tag = "users"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn register(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterBody>, JsonRejection>,
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

    let id = state.ids.next_id();
    let token = state.tickets.create(TicketPurpose::VerifyEmail, &id).await?;
    state
        .mailer
        .send(&email, "Verify Email", &verification_body(&body.url, &token))
        .await?;

    let hash = password::hash(&body.password).map_err(|err| ApiError::FailedHash(format!("{err:#}")))?;
    match users::insert(&pool, &id, &email, &hash)
        .await
        .map_err(ApiError::sql)?
    {
        EmailWrite::Done => {}
        // Insert race on the unique email index.
        EmailWrite::EmailTaken => return Err(ApiError::EmailTaken),
    }

    cache::invalidate(state.kv.as_ref(), "users").await;

    Ok(Json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All account profiles", body = [Profile]),
    ),
    tag = "users"
)]
pub async fn list(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let profiles: Vec<Profile> =
        cache::read_through(state.kv.as_ref(), "users", USERS_CACHE_TTL, || async {
            let all = users::list(&pool).await.map_err(ApiError::sql)?;
            Ok::<_, ApiError>(all.into_iter().map(Profile::from).collect())
        })
        .await?;
    Ok(Json(profiles))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyRequestBody {
    email: String,
    url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/verify",
    responses(
        (status = 204, description = "Verification email sent"),
        (status = 400, description = "Account already verified", body = [ErrorBody]),
        (status = 404, description = "No account with that email"),
    ),
    tag = "users"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn request_verification(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<VerifyRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_service_secret(&state, &headers)?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(ApiError::MissingParameter("email"));
    }
    if !valid_url(&body.url) {
        return Err(ApiError::MissingParameter("url"));
    }

    let user = users::get_by_email(&pool, &email)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    if user.verified {
        return Err(ApiError::AlreadyVerified);
    }

    let token = state
        .tickets
        .create(TicketPurpose::VerifyEmail, &user.id)
        .await?;
    state
        .mailer
        .send(&email, "Verify Email", &verification_body(&body.url, &token))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/v1/users/verify/{token}",
    params(("token" = String, Path, description = "Verification ticket")),
    responses(
        (status = 204, description = "Email verified"),
        (status = 404, description = "Unknown or expired ticket"),
    ),
    tag = "users"
)]
#[instrument(skip(pool, state))]
pub async fn confirm_verification(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state
        .tickets
        .redeem(TicketPurpose::VerifyEmail, &token)
        .await?
        .ok_or(ApiError::NotFound)?;

    users::set_verified(&pool, &user_id, true)
        .await
        .map_err(ApiError::sql)?;

    cache::invalidate(state.kv.as_ref(), &format!("user:{user_id}")).await;
    cache::invalidate(state.kv.as_ref(), "users").await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetRequestBody {
    email: String,
    url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users/reset",
    responses(
        (status = 204, description = "Reset email sent"),
        (status = 404, description = "No account with that email"),
    ),
    tag = "users"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn request_reset(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ResetRequestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_service_secret(&state, &headers)?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(ApiError::MissingParameter("email"));
    }
    if !valid_url(&body.url) {
        return Err(ApiError::MissingParameter("url"));
    }

    let user = users::get_by_email(&pool, &email)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;

    let token = state
        .tickets
        .create(TicketPurpose::ResetPassword, &user.id)
        .await?;
    state
        .mailer
        .send(&email, "Reset password", &reset_body(&body.url, &token))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetBody {
    password: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/users/reset/{token}",
    params(("token" = String, Path, description = "Reset ticket")),
    responses(
        (status = 204, description = "Password replaced"),
        (status = 404, description = "Unknown or expired ticket"),
    ),
    tag = "users"
)]
#[instrument(skip(pool, state, payload))]
pub async fn confirm_reset(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    Path(token): Path<String>,
    payload: Result<Json<ResetBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if !valid_password(&body.password) {
        return Err(ApiError::MissingParameter("password"));
    }

    let user_id = state
        .tickets
        .redeem(TicketPurpose::ResetPassword, &token)
        .await?
        .ok_or(ApiError::NotFound)?;

    let hash = password::hash(&body.password).map_err(|err| ApiError::FailedHash(format!("{err:#}")))?;
    users::set_password_hash(&pool, &user_id, &hash)
        .await
        .map_err(ApiError::sql)?;

    Ok(StatusCode::NO_CONTENT)
}
