use crate::{
    api::{rate_limit::FixedWindowLimiter, state::AppState},
    auth::{SessionManager, TicketIssuer},
    cli::actions::server::Args,
    git::gitea::GiteaBackend,
    ids::IdGenerator,
    kv::redis::RedisKv,
    mail::{LogMailer, Mailer, SmtpMailer},
    sync::SyncEngine,
};
use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::options,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod error;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;
pub mod rate_limit;
pub mod state;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(args: Args) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let kv = Arc::new(
        RedisKv::connect(&args.kv_address, &args.kv_password)
            .await
            .context("Failed to connect to key-value store")?,
    );

    let git = Arc::new(
        GiteaBackend::new(
            &args.git_url,
            &args.git_owner,
            args.git_token,
            &args.git_template_owner,
            &args.git_template,
        )
        .context("Failed to build git client")?,
    );

    let mailer: Arc<dyn Mailer> = match &args.smtp {
        Some(smtp) => Arc::new(
            SmtpMailer::new(&smtp.host, &smtp.username, &smtp.password, &smtp.from)
                .context("Failed to build SMTP transport")?,
        ),
        None => {
            info!("No SMTP relay configured, outgoing mail will be logged");
            Arc::new(LogMailer)
        }
    };

    let ids = Arc::new(IdGenerator::new());
    let state = Arc::new(AppState {
        kv: kv.clone(),
        sessions: SessionManager::new(kv.clone(), args.session_ttl, args.remember_ttl),
        tickets: TicketIssuer::new(kv, ids.clone()),
        ids,
        mailer,
        git: git.clone(),
        sync: SyncEngine::new(git),
        service_secret: args.service_secret,
        totp_issuer: args.totp_issuer,
    });

    let limiter = Arc::new(FixedWindowLimiter::new(args.rps));

    // Build the router from OpenAPI-wired routes, then extend it with the
    // preflight-only `OPTIONS /health`. The spec stays in openapi.rs for the
    // `openapi` binary.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn_with_state(
                    limiter,
                    rate_limit::enforce,
                ))
                .layer(Extension(state))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{}", args.port)).await?;

    info!("Listening on [::]:{}", args.port);

    // ConnectInfo feeds the peer address fallback used by the login handlers.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
