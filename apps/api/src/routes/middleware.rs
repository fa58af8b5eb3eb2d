//! Request correlation ids and the success envelope shared by every handler.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::ErrorDetails;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    fn generate() -> Self {
        RequestId(format!("req_{}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::generate))
    }
}

/// Assigns a request id (incoming `x-request-id` or a fresh one), stamps it
/// into error bodies and echoes it in the response header.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| RequestId(v.to_string()))
        .unwrap_or_else(RequestId::generate);
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;

    if let Some(details) = response.extensions().get::<ErrorDetails>().cloned() {
        let status = response.status();
        response = (status, Json(details.body(Some(&id.0)))).into_response();
    }
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: String,
}

/// `{"success": true, "data": ..., "meta": {"requestId", "timestamp"}}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(request_id: RequestId, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            meta: ResponseMeta {
                request_id: request_id.0,
                timestamp: Utc::now().to_rfc3339(),
            },
        })
    }
}
