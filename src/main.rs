mod app;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use std::net::SocketAddr;

use anyhow::{Context, Result};

use services::{build_provider, RedisCache, Transcriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting GridWatch backend"
    );

    // Create database pool and apply migrations
    let pool = db::create_pool(&settings).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Create Redis cache
    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;

    // Pick the classification provider once, from configuration
    let ai = build_provider(&settings)?;
    tracing::info!(provider = ai.name(), "AI provider selected");

    // Speech-to-text pass-through (canned fallback when unconfigured)
    let transcriber = Transcriber::new(&settings)?;

    // Create application state
    let state = app::AppState::new(pool, settings.clone(), cache, ai, transcriber);

    // Build application
    let app = app::create_app(state);

    // Start server (ConnectInfo feeds the per-IP rate limiter)
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
