//! Control-plane route definitions

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // HTTP crawler
        .route("/api/start", post(handlers::start_crawl))
        .route("/api/stop", post(handlers::stop_crawl))
        // External engines
        .route("/api/toc/start", post(handlers::start_toc))
        .route("/api/toc/stop", post(handlers::stop_toc))
        .route("/api/onionsearch/start", post(handlers::start_onionsearch))
        .route("/api/onionsearch/stop", post(handlers::stop_onionsearch))
        .route("/api/torbot/start", post(handlers::start_torbot))
        .route("/api/torbot/stop", post(handlers::stop_torbot))
        // Observation
        .route("/api/status", get(handlers::status))
        .route("/api/torbot/progress", get(handlers::torbot_progress))
        .route("/api/sync/status", get(handlers::sync_status))
        .route("/api/sync/force", post(handlers::sync_force))
        .with_state(state)
}
