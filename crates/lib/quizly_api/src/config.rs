//! API server configuration.

use quizly_core::auth::jwt::resolve_token_secret;

/// Default CORS origin (the web client in development).
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3001";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Access token signing secret.
    pub access_token_secret: String,
    /// Refresh token signing secret.
    pub refresh_token_secret: String,
    /// Origin allowed to make credentialed cross-origin requests.
    pub allowed_origin: String,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable               | Default                                  |
    /// |------------------------|------------------------------------------|
    /// | `BIND_ADDR`            | `127.0.0.1:3000`                         |
    /// | `DATABASE_URL`         | `postgres://localhost:5432/quizly`       |
    /// | `ACCESS_TOKEN_SECRET`  | generated & persisted to file            |
    /// | `REFRESH_TOKEN_SECRET` | generated & persisted to file            |
    /// | `ALLOWED_ORIGIN`       | `http://localhost:3001`                  |
    /// | `COOKIE_SECURE`        | `true`                                   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/quizly".into()),
            access_token_secret: resolve_token_secret("ACCESS_TOKEN_SECRET", "access-secret"),
            refresh_token_secret: resolve_token_secret("REFRESH_TOKEN_SECRET", "refresh-secret"),
            allowed_origin: std::env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGIN.into()),
            secure_cookies: std::env::var("COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
