use anyhow::Context;
use clap::Parser;
use sensor_api::{build_app, config::Config, db, metrics};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sensor API");
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.database_target());
    info!("Permissive CORS: {}", config.cors_permissive);

    metrics::init_metrics().context("failed to register metrics")?;

    let pool = db::make_pool(
        &config.database_url,
        config.db_max_connections,
        config.acquire_timeout(),
    )
    .context("invalid database URL")?;

    if config.run_migrations {
        db::run_migrations(&pool)
            .await
            .context("failed to prepare database schema")?;
    }

    let app = build_app(pool.clone(), config.cors_permissive);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutting down");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
