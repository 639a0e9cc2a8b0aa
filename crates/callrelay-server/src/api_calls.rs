//! Outbound call control: placing calls and interrupting live ones.

use crate::api::ApiError;
use crate::api_voice::{CALL_STATUS_PATH, OUTBOUND_PATH, PROCESS_SPEECH_PATH};
use crate::AppState;
use axum::extract::{Extension, Json, Path};
use callrelay_session::SessionStore;
use callrelay_types::{CallDirection, CallSession, CallStatus};
use callrelay_voice::{CreateCall, VoiceResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Twilio answering machine detection mode used for outbound calls.
const MACHINE_DETECTION: &str = "DetectMessageEnd";

/// Admission control for outbound calls.
///
/// Counts calls whose create request is still in flight, so the concurrent
/// call cap holds while Twilio is being called and before the session
/// exists.
#[derive(Clone, Debug, Default)]
pub struct CallSlots {
    pending: Arc<Mutex<usize>>,
}

impl CallSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(|poisoned| {
            tracing::error!("call slot lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Reserves a slot unless live sessions plus in-flight calls already
    /// reach `limit`. A limit of 0 means unlimited.
    pub fn try_reserve(&self, sessions: &SessionStore, limit: usize) -> Option<SlotReservation> {
        let mut pending = self.lock();
        if limit > 0 && sessions.active_count() + *pending >= limit {
            return None;
        }
        *pending += 1;
        Some(SlotReservation {
            slots: self.clone(),
        })
    }

    /// Calls reserved but not yet released.
    pub fn pending(&self) -> usize {
        *self.lock()
    }
}

/// A reserved outbound call slot, released on drop.
#[derive(Debug)]
pub struct SlotReservation {
    slots: CallSlots,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        let mut pending = self.slots.lock();
        *pending = pending.saturating_sub(1);
    }
}

/// Request body for `POST /make-call`.
#[derive(Debug, Deserialize)]
pub struct MakeCallRequest {
    /// Number to dial, E.164 (e.g. `+14155550100`).
    pub to_number: Option<String>,
    /// Caller ID; defaults to the configured Twilio number.
    #[serde(default)]
    pub from_number: Option<String>,
    /// Greeting spoken instead of the configured one when the call is answered.
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Response body for a placed call.
#[derive(Debug, Serialize, Deserialize)]
pub struct MakeCallResponse {
    pub success: bool,
    pub call_sid: String,
    pub status: CallStatus,
    pub to: String,
    pub from: String,
}

/// Whether `number` looks like an E.164 phone number.
pub fn is_e164(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0')
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Handler for `POST /make-call`.
pub async fn make_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<MakeCallRequest>,
) -> Result<Json<MakeCallResponse>, ApiError> {
    let to = non_blank(payload.to_number)
        .ok_or_else(|| ApiError::BadRequest("to_number is required".to_string()))?;
    if !is_e164(&to) {
        return Err(ApiError::BadRequest(format!(
            "to_number must be in E.164 format: {to}"
        )));
    }

    let from = non_blank(payload.from_number)
        .or_else(|| non_blank(Some(state.twilio.phone_number().to_string())))
        .ok_or_else(|| {
            ApiError::BadRequest(
                "from_number is required when no Twilio phone number is configured".to_string(),
            )
        })?;

    if !state.twilio.is_enabled() {
        return Err(ApiError::Unavailable("twilio is not configured".to_string()));
    }

    let slot = state
        .call_slots
        .try_reserve(&state.sessions, state.max_concurrent_calls)
        .ok_or_else(|| {
            tracing::warn!(
                limit = state.max_concurrent_calls,
                "refusing outbound call, concurrent call limit reached"
            );
            ApiError::Unavailable("maximum concurrent calls reached".to_string())
        })?;

    let params = CreateCall {
        to: to.clone(),
        from: from.clone(),
        url: state.webhook_url(OUTBOUND_PATH),
        status_callback: Some(state.webhook_url(CALL_STATUS_PATH)),
        machine_detection: Some(MACHINE_DETECTION.to_string()),
        record: true,
    };

    let call = state.twilio.create_call(&params).await.map_err(|e| {
        tracing::error!(to = %to, "error making call: {}", e);
        ApiError::from(e)
    })?;

    let mut session = CallSession::new(
        &call.sid,
        &from,
        &to,
        CallDirection::Outbound,
        call.status,
    );
    session.initial_message = non_blank(payload.initial_message);
    state.sessions.create_or_merge(session);
    // The session now counts toward the cap itself.
    drop(slot);

    tracing::info!(call_sid = %call.sid, to = %to, "call initiated");

    Ok(Json(MakeCallResponse {
        success: true,
        call_sid: call.sid,
        status: call.status,
        to,
        from,
    }))
}

/// Handler for `POST /interrupt-call/{call_sid}`.
///
/// Cuts off whatever the call is playing and goes back to listening.
pub async fn interrupt_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.sessions.contains(&call_sid) {
        return Err(ApiError::NotFound("call session not found".to_string()));
    }

    let twiml = VoiceResponse::new()
        .pause(1)
        .gather(state.speech_gather(&[]))
        .redirect(state.webhook_url(PROCESS_SPEECH_PATH))
        .to_xml();

    state
        .twilio
        .update_call_twiml(&call_sid, &twiml)
        .await
        .map_err(|e| {
            tracing::error!(call_sid = %call_sid, "error interrupting call: {}", e);
            ApiError::from(e)
        })?;

    tracing::info!(call_sid = %call_sid, "interrupted call");
    Ok(Json(json!({ "success": true, "call_sid": call_sid })))
}
