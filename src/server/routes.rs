//! Route table for the control server.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Build the router with all API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/crawler/crawl", post(handlers::trigger_crawl))
        .route("/api/crawler/import", post(handlers::import_articles))
        .route("/api/crawler/active", get(handlers::active_crawls))
        .route(
            "/api/crawler/config",
            get(handlers::list_sources).post(handlers::create_source),
        )
        .route(
            "/api/crawler/config/:site_name",
            get(handlers::get_source).put(handlers::update_source),
        )
        .route("/api/crawler/results", get(handlers::list_articles))
        .route("/api/crawler/article/:id", get(handlers::get_article))
        .route("/api/crawler/logs", get(handlers::list_logs))
        .route("/api/crawler/logs/:id", get(handlers::get_log))
        .route("/api/crawler/stats", get(handlers::stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
