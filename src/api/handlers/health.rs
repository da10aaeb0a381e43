use std::sync::Arc;

use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;
use crate::api::state::AppState;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    kv: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and key-value store are healthy", body = [Health]),
        (status = 503, description = "Database or key-value store is unhealthy", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(
    method: Method,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let database_ok = match pool.0.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(error) => {
                    error!("Failed to ping database: {}", error);
                    false
                }
            }
        }
        Err(error) => {
            error!("Failed to acquire database connection: {}", error);
            false
        }
    };

    let kv_ok = match state.kv.ping().await {
        Ok(()) => true,
        Err(error) => {
            error!("Failed to ping key-value store: {}", error);
            false
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "ok" } else { "error" }.to_string(),
        kv: if kv_ok { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app| {
            debug!("X-App header: {:?}", x_app);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app);
            headers
        })
        .unwrap_or_default();

    if database_ok && kv_ok {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
