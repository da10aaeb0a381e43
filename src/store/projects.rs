use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

pub async fn insert(pool: &PgPool, id: &str, user_id: &str, name: &str) -> Result<()> {
    let query = "INSERT INTO projects (id, user_id, name) VALUES ($1, $2, $3)";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .bind(user_id)
        .bind(name)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert project")?;

    Ok(())
}

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<Project>> {
    let query = "SELECT id, user_id, name FROM projects WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );

    sqlx::query_as::<_, Project>(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch project")
}

pub async fn list_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Project>> {
    let query = "SELECT id, user_id, name FROM projects WHERE user_id = $1 ORDER BY id";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );

    sqlx::query_as::<_, Project>(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list projects")
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<()> {
    let query = "DELETE FROM projects WHERE id = $1";

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );

    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete project")?;

    Ok(())
}
