//! Read-only views of the call session map.

use crate::{api::ApiError, AppState};
use axum::extract::{Extension, Json, Path};
use callrelay_types::{CallSession, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Response body for `GET /sessions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    /// Number of sessions held, ended calls included.
    pub active_sessions: usize,
    /// Sessions still in a live call.
    pub in_progress: usize,
    pub sessions: BTreeMap<String, SessionSummary>,
}

/// Handler for `GET /sessions`.
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<SessionsResponse> {
    let sessions = state.sessions.summaries();
    Json(SessionsResponse {
        active_sessions: sessions.len(),
        in_progress: state.sessions.active_count(),
        sessions,
    })
}

/// Handler for `GET /session/{call_sid}`.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallSession>, ApiError> {
    state
        .sessions
        .get(&call_sid)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))
}
