use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.store.len().await?;
    let dimension = state.store.dimension().await?;
    let defaults = state.orchestrator.config();
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0);

    Ok(Json(json!({
        "documents": documents,
        "dimension": dimension,
        "backend": state.store.backend_name(),
        "embedder": state.store.embedder_name(),
        "generator": state.orchestrator.generator_name(),
        "top_k": defaults.top_k,
        "relevance_threshold": defaults.relevance_threshold,
        "uptime_secs": uptime_secs
    })))
}
