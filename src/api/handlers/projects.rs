//! Workspace (project) lifecycle and content synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use super::{PROJECTS_CACHE_TTL, require_session, valid_name, valid_password};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::AppState;
use crate::auth::password;
use crate::cache;
use crate::git::tree;
use crate::store::projects::{self, Project};
use crate::store::users;
use crate::sync::{BASE_BRANCH, LocalFile, WORKING_BRANCH, repo_name};

#[utoipa::path(
    get,
    path = "/api/v1/projects",
    responses(
        (status = 200, description = "Caller's projects", body = [Project]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "projects"
)]
pub async fn list(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let key = format!("projects:{}", session.user_id);
    let owned: Vec<Project> =
        cache::read_through(state.kv.as_ref(), &key, PROJECTS_CACHE_TTL, || async {
            projects::list_for_user(&pool, &session.user_id)
                .await
                .map_err(ApiError::sql)
        })
        .await?;
    Ok(Json(owned))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateBody {
    name: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/projects",
    responses(
        (status = 201, description = "Project created from the template repository"),
        (status = 400, description = "Invalid name", body = [ErrorBody]),
        (status = 401, description = "Session missing or expired"),
    ),
    tag = "projects"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn create(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    if !valid_name(&body.name) {
        return Err(ApiError::MissingParameter("name"));
    }

    let id = state.ids.next_id();
    let repo = repo_name(&session.user_id, &id);

    state
        .git
        .create_repo_from_template(&repo, &body.name)
        .await?;

    // Compensate on any later failure so no orphan repository remains.
    if let Err(err) = state
        .git
        .create_branch(&repo, WORKING_BRANCH, BASE_BRANCH)
        .await
    {
        rollback_repo(&state, &repo).await;
        return Err(err.into());
    }

    if let Err(err) = projects::insert(&pool, &id, &session.user_id, &body.name).await {
        rollback_repo(&state, &repo).await;
        return Err(ApiError::sql(err));
    }

    cache::invalidate(state.kv.as_ref(), &format!("projects:{}", session.user_id)).await;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn rollback_repo(state: &AppState, repo: &str) {
    if let Err(err) = state.git.delete_repo(repo).await {
        warn!("Failed to roll back repository {repo}: {err}");
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project record", body = Project),
        (status = 404, description = "No such project"),
    ),
    tag = "projects"
)]
pub async fn get(
    pool: Extension<PgPool>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project = projects::get(&pool, &id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(project))
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct DeleteBody {
    password: String,
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project and repository deleted"),
        (status = 400, description = "Wrong password", body = [ErrorBody]),
        (status = 404, description = "No such project"),
    ),
    tag = "projects"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn delete(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<DeleteBody>, JsonRejection>,
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

    let project = projects::get(&pool, &id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    if project.user_id != session.user_id {
        return Err(ApiError::ProjectNoAccess);
    }

    projects::delete(&pool, &id).await.map_err(ApiError::sql)?;

    // Record first, repository second. If the repository delete fails the
    // record is re-created best-effort and the failure surfaces.
    let repo = repo_name(&session.user_id, &id);
    if let Err(err) = state.git.delete_repo(&repo).await {
        if let Err(insert_err) =
            projects::insert(&pool, &project.id, &project.user_id, &project.name).await
        {
            warn!("Failed to restore project record {id}: {insert_err:#}");
        }
        return Err(err.into());
    }

    cache::invalidate(state.kv.as_ref(), &format!("projects:{}", session.user_id)).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SyncBody {
    project_id: String,
    /// Current client-side content, path to text.
    files: HashMap<String, String>,
    /// Paths the client removed.
    delete: Vec<String>,
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/contents",
    responses(
        (status = 200, description = "Applied per-path decisions"),
        (status = 204, description = "Branch already in sync, nothing committed"),
        (status = 403, description = "Caller does not own the project", body = [ErrorBody]),
        (status = 404, description = "No such project"),
    ),
    tag = "projects"
)]
#[instrument(skip(pool, state, headers, payload))]
pub async fn sync_contents(
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SyncBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let session = require_session(&state, &headers).await?;
    let Json(body) = payload.map_err(|err| ApiError::MalformedBody(err.to_string()))?;

    let project = projects::get(&pool, &body.project_id)
        .await
        .map_err(ApiError::sql)?
        .ok_or(ApiError::NotFound)?;
    if project.user_id != session.user_id {
        return Err(ApiError::ProjectNoAccess);
    }

    let edits: Vec<LocalFile> = body
        .files
        .into_iter()
        .map(|(path, content)| LocalFile { path, content })
        .collect();

    let repo = repo_name(&session.user_id, &body.project_id);
    let applied = state
        .sync
        .apply(&repo, &session.user_id, &edits, &body.delete)
        .await?;

    if applied.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(applied).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/contents",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Nested file listing of the working branch"),
        (status = 401, description = "Session missing or expired"),
        (status = 404, description = "No repository or working branch"),
    ),
    tag = "projects"
)]
#[instrument(skip(state, headers))]
pub async fn get_contents(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;

    let repo = repo_name(&session.user_id, &id);
    let head = state
        .git
        .branch_head(&repo, WORKING_BRANCH)
        .await?
        .ok_or(ApiError::NotFound)?;
    let entries = state.git.get_tree(&repo, &head).await?;

    Ok(Json(tree::nest(&entries)))
}

#[derive(Deserialize, Debug)]
pub struct FileQuery {
    path: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/file",
    params(
        ("id" = String, Path, description = "Project id"),
        ("path" = String, Query, description = "File path inside the repository"),
    ),
    responses(
        (status = 200, description = "Raw file bytes"),
        (status = 400, description = "Missing path parameter", body = [ErrorBody]),
        (status = 404, description = "No such file on the working branch"),
    ),
    tag = "projects"
)]
#[instrument(skip(state, headers))]
pub async fn get_file(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let path = query
        .path
        .filter(|path| !path.is_empty())
        .ok_or(ApiError::MissingParameter("path"))?;

    let repo = repo_name(&session.user_id, &id);
    let bytes = state
        .git
        .get_raw_file(&repo, WORKING_BRANCH, &path)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(bytes)
}
