pub mod batching;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod rest;
pub mod validate;

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

/// Full HTTP surface: sensor API, health and `/metrics`.
pub fn build_app(pool: PgPool, cors_permissive: bool) -> Router {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pool));

    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
