use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::Metadata;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentInput {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentsRequest {
    pub items: Vec<DocumentInput>,
}

pub async fn add_documents(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddDocumentsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.items.iter().any(|item| item.text.trim().is_empty()) {
        return Err(ApiError::BadRequest("document text must not be empty".to_string()));
    }

    let items = payload
        .items
        .into_iter()
        .map(|item| (item.text, item.metadata))
        .collect();
    let ids = state.store.add(items).await?;
    let total = state.store.len().await?;

    Ok(Json(json!({
        "added": ids.len(),
        "total": total
    })))
}
