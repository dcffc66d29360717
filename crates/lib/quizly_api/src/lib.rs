//! # quizly_api
//!
//! HTTP surface for Quizly session identity: cookie credentials, the auth
//! middleware every protected feature route sits behind, and the
//! `me`/`log-in`/`log-out` endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::Router;
use axum::http::Method;
use axum::http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, DATE, HeaderName, HeaderValue};
use axum::routing::{get, post};
use quizly_core::auth::session::SessionResolver;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{auth, unknown_route};

/// Route paths.
pub mod routes {
    pub const GET_USER_ME: &str = "/api/user/me";
    pub const POST_USER_LOG_IN: &str = "/api/user/log-in";
    pub const USER_LOG_OUT: &str = "/api/user/log-out";
}

/// Shared application state passed to all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Session identity resolver.
    pub resolver: SessionResolver,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
///
/// Delegates to `quizly_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    quizly_core::migrate::migrate(pool).await
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origin = match config.allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            warn!(origin = %config.allowed_origin, error = %e, "invalid ALLOWED_ORIGIN, cross-origin requests disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::DELETE,
            Method::PATCH,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
            ACCEPT,
            HeaderName::from_static("accept-version"),
            CONTENT_LENGTH,
            HeaderName::from_static("content-md5"),
            CONTENT_TYPE,
            DATE,
            HeaderName::from_static("x-api-version"),
        ])
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_USER_LOG_IN, post(auth::login_handler))
        .route(
            routes::USER_LOG_OUT,
            get(auth::logout_handler).post(auth::logout_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_USER_ME, get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(unknown_route)
        .layer(cors)
        .with_state(state)
}
