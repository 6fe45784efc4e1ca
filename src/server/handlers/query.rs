use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::rag::QueryOptions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let options = QueryOptions {
        top_k: payload.top_k,
        threshold: payload.threshold,
    };
    let result = state.orchestrator.answer_with(&payload.query, options).await?;
    tracing::info!(
        "Answered query with {} accepted of {} retrieved",
        result.accepted_count,
        result.retrieved.len()
    );
    Ok(Json(result))
}
