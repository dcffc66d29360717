//! Quizly API server binary.
//!
//! Connects to PostgreSQL, runs migrations, and serves the session identity
//! routes until interrupted.

use std::sync::Arc;

use clap::Parser;
use quizly_core::auth::cache::MemoryIdentityCache;
use quizly_core::auth::jwt::TokenCodec;
use quizly_core::auth::session::SessionResolver;
use quizly_core::auth::store::PgUserStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "quizly_api_server", about = "Quizly API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR` when set.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/quizly"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,quizly_api=debug,quizly_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = quizly_api::config::ApiConfig::from_env();
    config.pg_connection_url = args.database_url;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting quizly_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    quizly_api::migrate(&pool).await?;

    let resolver = SessionResolver::new(
        Arc::new(PgUserStore::new(pool)),
        Arc::new(MemoryIdentityCache::new()),
        TokenCodec::new(&config.access_token_secret, &config.refresh_token_secret),
    );

    let state = quizly_api::AppState {
        resolver,
        config: config.clone(),
    };
    let app = quizly_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
