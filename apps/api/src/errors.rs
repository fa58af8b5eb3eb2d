use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::ai::AiError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    /// Operation not allowed in the session's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Turn sequence mismatch: expected {expected}, received {received}")]
    SequenceMismatch { expected: i32, received: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("AI provider quota exhausted")]
    ProviderQuotaExhausted,

    #[error("AI provider rate limited")]
    ProviderRateLimited,

    #[error("AI generation failed: {0}")]
    ProviderError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AiError> for AppError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::QuotaExhausted(_) => AppError::ProviderQuotaExhausted,
            AiError::RateLimited(_) => AppError::ProviderRateLimited,
            AiError::Provider(msg) => AppError::ProviderError(msg),
        }
    }
}

/// Code and message of an error response, left in the response extensions so
/// the request-id middleware can stamp the correlation id into the body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub code: &'static str,
    pub message: String,
}

impl ErrorDetails {
    pub fn body(&self, request_id: Option<&str>) -> Value {
        json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            },
            "meta": {
                "requestId": request_id,
                "timestamp": Utc::now().to_rfc3339(),
            }
        })
    }
}

impl AppError {
    fn status_and_details(&self) -> (StatusCode, ErrorDetails) {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this interview".to_string(),
            ),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg.clone()),
            AppError::SequenceMismatch { .. } => {
                (StatusCode::CONFLICT, "SEQUENCE_MISMATCH", self.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::ProviderQuotaExhausted => (
                StatusCode::SERVICE_UNAVAILABLE,
                "AI_QUOTA_EXHAUSTED",
                "The AI service has reached its usage limit. Contact an administrator or try again later."
                    .to_string(),
            ),
            AppError::ProviderRateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "AI_RATE_LIMITED",
                "The AI service is busy. Please try again shortly.".to_string(),
            ),
            AppError::ProviderError(msg) => {
                tracing::error!("AI generation error: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "AI_GENERATION_FAILED",
                    "Question generation failed. Please try again shortly.".to_string(),
                )
            }
            AppError::Store(StoreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Interview not found: {id}"),
            ),
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };
        (status, ErrorDetails { code, message })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = self.status_and_details();
        let mut response = (status, Json(details.body(None))).into_response();
        response.extensions_mut().insert(details);
        response
    }
}
