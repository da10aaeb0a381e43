//! API error taxonomy.
//!
//! Every failure a handler can produce maps to one stable machine code so
//! clients can branch on `code` without parsing prose. The HTTP status is
//! derived from the variant in exactly one place.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::session::SessionError;
use crate::cache::CacheError;
use crate::git::GitError;
use crate::kv::KvError;
use crate::mail::MailError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authorization header missing")]
    AuthorizationMissing,
    #[error("authorization invalid")]
    AuthorizationInvalid,
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("missing or invalid parameter: {0}")]
    MissingParameter(&'static str),
    #[error("not found")]
    NotFound,
    #[error("invalid credentials")]
    CredentialsInvalid,
    #[error("email already taken")]
    EmailTaken,
    #[error("email already verified")]
    AlreadyVerified,
    #[error("no access to this project")]
    ProjectNoAccess,
    #[error("request ceiling reached")]
    TooManyRequests,
    #[error("password hashing failed")]
    FailedHash(String),
    #[error("stored record failed to parse")]
    FailedParse(String),
    #[error("record failed to serialize")]
    FailedStringify(String),
    #[error("token generation failed")]
    FailedToken(String),
    #[error("email delivery failed")]
    FailedEmail(String),
    #[error("TOTP operation failed")]
    FailedTotp(String),
    #[error("database error")]
    Sql(String),
    #[error("key-value store error")]
    Kv(String),
    #[error("git backend error")]
    Git(String),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Optional human-readable diagnostic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationMissing => "authorization_missing",
            Self::AuthorizationInvalid => "authorization_invalid",
            Self::MalformedBody(_) => "malformed_body",
            Self::MissingParameter(_) => "missing_parameter",
            Self::NotFound => "not_found",
            Self::CredentialsInvalid => "user_credentials_invalid",
            Self::EmailTaken => "user_email_taken",
            Self::AlreadyVerified => "user_already_verified",
            Self::ProjectNoAccess => "project_no_access",
            Self::TooManyRequests => "too_many_requests",
            Self::FailedHash(_) => "server_failed_hash",
            Self::FailedParse(_) => "server_failed_parse",
            Self::FailedStringify(_) => "server_failed_stringify",
            Self::FailedToken(_) => "server_failed_token",
            Self::FailedEmail(_) => "server_failed_email",
            Self::FailedTotp(_) => "server_failed_totp",
            Self::Sql(_) => "server_sql_error",
            Self::Kv(_) => "server_kv_error",
            Self::Git(_) => "server_git_error",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::AuthorizationMissing | Self::AuthorizationInvalid => StatusCode::UNAUTHORIZED,
            Self::MalformedBody(_)
            | Self::MissingParameter(_)
            | Self::CredentialsInvalid
            | Self::EmailTaken
            | Self::AlreadyVerified => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ProjectNoAccess => StatusCode::FORBIDDEN,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::FailedHash(_)
            | Self::FailedParse(_)
            | Self::FailedStringify(_)
            | Self::FailedToken(_)
            | Self::FailedEmail(_)
            | Self::FailedTotp(_)
            | Self::Sql(_)
            | Self::Kv(_)
            | Self::Git(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::MalformedBody(detail) => Some(detail.clone()),
            Self::MissingParameter(name) => Some((*name).to_string()),
            _ => None,
        }
    }

    /// Database failure; logged with full context, reported by code only.
    pub fn sql(err: anyhow::Error) -> Self {
        Self::Sql(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::FailedHash(detail)
                | Self::FailedParse(detail)
                | Self::FailedStringify(detail)
                | Self::FailedToken(detail)
                | Self::FailedEmail(detail)
                | Self::FailedTotp(detail)
                | Self::Sql(detail)
                | Self::Kv(detail)
                | Self::Git(detail) => error!(code = self.code(), "{detail}"),
                _ => error!(code = self.code(), "{self}"),
            }
        }
        let body = ErrorBody {
            code: self.code(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        Self::Kv(err.to_string())
    }
}

impl From<GitError> for ApiError {
    fn from(err: GitError) -> Self {
        Self::Git(err.to_string())
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        Self::FailedEmail(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unknown => Self::AuthorizationInvalid,
            SessionError::Malformed => Self::FailedParse("session record".to_string()),
            SessionError::Store(store) => store.into(),
        }
    }
}

impl From<CacheError<ApiError>> for ApiError {
    fn from(err: CacheError<ApiError>) -> Self {
        match err {
            CacheError::Decode(decode) => Self::FailedParse(decode.to_string()),
            CacheError::Fetch(inner) => inner,
        }
    }
}
