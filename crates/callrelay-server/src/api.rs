//! Shared API types and status handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<callrelay_voice::VoiceError> for ApiError {
    fn from(err: callrelay_voice::VoiceError) -> Self {
        use callrelay_voice::VoiceError;
        match err {
            VoiceError::NotConfigured => ApiError::Unavailable(err.to_string()),
            VoiceError::Twilio { .. } | VoiceError::Http(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

/// Handler for `GET /`.
pub async fn root_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Twilio voice relay is running",
        "active_sessions": state.sessions.len(),
        "public_url": state.public_url,
    }))
}

/// Handler for `GET /health`.
///
/// Used by load balancers and monitoring to verify the server is running.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "twilio_configured": state.twilio.is_enabled(),
        "active_sessions": state.sessions.len(),
    }))
}
