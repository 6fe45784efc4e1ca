use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{config, documents, health, query};
use crate::state::AppState;

/// Creates the application router.
///
/// Routes:
/// - `GET /health`, `GET /api/stats`
/// - `GET /api/config` (secrets redacted)
/// - `POST /api/query`, `POST /api/documents`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/stats", get(health::get_stats))
        .route("/api/config", get(config::get_config))
        .route("/api/query", post(query::run_query))
        .route("/api/documents", post(documents::add_documents))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
