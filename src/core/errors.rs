use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures of the retrieval-and-grounding engine.
///
/// `EmptyStore` is the only recoverable variant: the orchestrator turns it
/// into "no evidence" and keeps going.
#[derive(Debug, Error)]
pub enum GroundingError {
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("evidence store is empty")]
    EmptyStore,
    #[error("generation failed: {0}")]
    GenerationFailure(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl GroundingError {
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        GroundingError::EmbeddingFailure(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        GroundingError::GenerationFailure(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        GroundingError::Storage(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<GroundingError> for ApiError {
    fn from(err: GroundingError) -> Self {
        match err {
            GroundingError::InvalidRequest(_) | GroundingError::DimensionMismatch { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            GroundingError::EmbeddingFailure(_) | GroundingError::GenerationFailure(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            GroundingError::EmptyStore | GroundingError::Storage(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
