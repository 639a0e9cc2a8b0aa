//! Twilio voice webhooks.
//!
//! Twilio posts form-encoded call events here and executes the TwiML we
//! return. Each conversational turn is one round trip:
//!
//! 1. `/voice/incoming` or `/voice/outbound` answers with a greeting and a
//!    speech `<Gather>` whose action is `/voice/process-speech`.
//! 2. `/voice/process-speech` records the transcript, generates a reply and
//!    either gathers again or hangs up.
//! 3. `/call-status` receives lifecycle updates until the call ends.
//!
//! These handlers always answer with TwiML so a call never dead-ends on an
//! error page.

use crate::AppState;
use axum::{
    extract::{Extension, Form, Json},
    http::header,
    response::{IntoResponse, Response},
};
use callrelay_types::{CallDirection, CallStatus, TurnRecord};
use callrelay_voice::{Gather, Say, SpeechTimeout, VoiceResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const INCOMING_PATH: &str = "/voice/incoming";
pub const OUTBOUND_PATH: &str = "/voice/outbound";
pub const PROCESS_SPEECH_PATH: &str = "/voice/process-speech";
pub const CALL_STATUS_PATH: &str = "/call-status";

/// Hints added to the default set once a conversation is underway.
const CONVERSATION_HINTS: &[&str] = &["goodbye", "thanks"];

/// A TwiML document as an HTTP response.
#[derive(Debug, Clone)]
pub struct Twiml(pub VoiceResponse);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/xml")],
            self.0.to_xml(),
        )
            .into_response()
    }
}

/// Fields Twilio sends with every voice webhook.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    pub call_sid: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// `inbound`, `outbound-api` or `outbound-dial`.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub speech_result: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub recording_sid: Option<String>,
}

impl VoiceWebhook {
    fn call_direction(&self, fallback: CallDirection) -> CallDirection {
        match self.direction.as_deref() {
            Some(d) if d.starts_with("outbound") => CallDirection::Outbound,
            Some("inbound") => CallDirection::Inbound,
            _ => fallback,
        }
    }
}

/// Body of Twilio's status callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCallback {
    pub call_sid: String,
    pub call_status: String,
    /// `human`, `machine_start`, `fax`, ... when machine detection is on.
    #[serde(default)]
    pub answered_by: Option<String>,
    #[serde(default)]
    pub call_duration: Option<String>,
}

impl AppState {
    /// A speech `<Gather>` posting to `/voice/process-speech`.
    pub(crate) fn speech_gather(&self, extra_hints: &[&str]) -> Gather {
        let voice = &self.voice;
        let mut hints = voice.hints.clone();
        for hint in extra_hints {
            if !hints.iter().any(|h| h == hint) {
                hints.push((*hint).to_string());
            }
        }
        Gather {
            action: Some(self.webhook_url(PROCESS_SPEECH_PATH)),
            speech_timeout: Some(match voice.speech_timeout {
                0 => SpeechTimeout::Auto,
                secs => SpeechTimeout::Seconds(secs),
            }),
            language: Some(voice.gather_language.clone()),
            hints,
            speech_model: Some(voice.speech_model.clone()).filter(|m| !m.is_empty()),
            enhanced: voice.enhanced,
        }
    }

    /// Greeting, speech capture, and a retry loop back to `answer_path` when
    /// the caller says nothing.
    fn answer(&self, greeting: &str, answer_path: &str) -> VoiceResponse {
        let voice = &self.voice;
        VoiceResponse::new()
            .say(
                Say::new(greeting)
                    .voice(&voice.greeting_voice)
                    .language(&voice.language),
            )
            .gather(self.speech_gather(&[]))
            .say(Say::new(&voice.no_input_prompt).voice(&voice.greeting_voice))
            .redirect(self.webhook_url(answer_path))
    }
}

/// Handler for `POST /voice/incoming`.
pub async fn incoming_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(call): Form<VoiceWebhook>,
) -> Twiml {
    tracing::info!(call_sid = %call.call_sid, from = %call.from, "incoming call answered");

    let session = state.sessions.get_or_create(
        &call.call_sid,
        &call.from,
        &call.to,
        call.call_direction(CallDirection::Inbound),
    );
    let greeting = session
        .initial_message
        .as_deref()
        .unwrap_or(&state.voice.greeting);

    Twiml(state.answer(greeting, INCOMING_PATH))
}

/// Handler for `POST /voice/outbound`.
///
/// Twilio fetches this once the callee picks up a call placed by
/// `/make-call`.
pub async fn outbound_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(call): Form<VoiceWebhook>,
) -> Twiml {
    tracing::info!(call_sid = %call.call_sid, "outbound call answered");

    let session = state.sessions.get_or_create(
        &call.call_sid,
        &call.from,
        &call.to,
        call.call_direction(CallDirection::Outbound),
    );
    if !session.is_ended() && session.status != CallStatus::InProgress {
        if let Err(e) = state
            .sessions
            .set_status(&call.call_sid, CallStatus::InProgress)
        {
            tracing::warn!(call_sid = %call.call_sid, "failed to mark call answered: {}", e);
        }
    }
    let greeting = session
        .initial_message
        .as_deref()
        .unwrap_or(&state.voice.greeting);

    Twiml(state.answer(greeting, OUTBOUND_PATH))
}

/// Handler for `POST /voice/process-speech`.
pub async fn process_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(call): Form<VoiceWebhook>,
) -> Twiml {
    let call_sid = call.call_sid.as_str();
    let utterance = call.speech_result.as_deref().unwrap_or_default().trim();
    let confidence = call
        .confidence
        .as_deref()
        .and_then(|c| c.trim().parse::<f32>().ok());

    tracing::info!(call_sid, speech = utterance, ?confidence, "caller speech received");
    if let Some(url) = &call.recording_url {
        tracing::debug!(call_sid, recording_url = %url, "caller speech recording available");
    }

    state.sessions.get_or_create(
        call_sid,
        &call.from,
        &call.to,
        call.call_direction(CallDirection::Inbound),
    );
    let history = state.sessions.history(call_sid);

    if !utterance.is_empty() {
        let turn = TurnRecord::caller(utterance, confidence)
            .with_recording(call.recording_url.clone(), call.recording_sid.clone());
        if let Err(e) = state.sessions.append_turn(call_sid, turn) {
            tracing::warn!(call_sid, "failed to record caller turn: {}", e);
        }
    }

    let reply = state.responder.reply(utterance, &history);
    tracing::info!(call_sid, reply = %reply.text, end_call = reply.end_call, "assistant reply");

    if let Err(e) = state
        .sessions
        .append_turn(call_sid, TurnRecord::assistant(&reply.text))
    {
        tracing::warn!(call_sid, "failed to record assistant turn: {}", e);
    }

    let voice = &state.voice;
    let response = VoiceResponse::new().say(Say::new(&reply.text).voice(&voice.reply_voice));

    let response = if reply.end_call {
        if let Err(e) = state.sessions.set_status(call_sid, CallStatus::Completed) {
            tracing::warn!(call_sid, "failed to mark call ended: {}", e);
        }
        response.hangup()
    } else {
        response
            .gather(state.speech_gather(CONVERSATION_HINTS))
            .say(Say::new(&voice.follow_up_prompt).voice(&voice.reply_voice))
            .redirect(state.webhook_url(PROCESS_SPEECH_PATH))
    };

    Twiml(response)
}

/// Handler for `POST /call-status`.
pub async fn call_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(update): Form<StatusCallback>,
) -> Json<Value> {
    let call_sid = update.call_sid.as_str();
    tracing::info!(
        call_sid,
        status = %update.call_status,
        answered_by = update.answered_by.as_deref().unwrap_or("-"),
        duration = update.call_duration.as_deref().unwrap_or("-"),
        "call status update"
    );

    if update
        .answered_by
        .as_deref()
        .is_some_and(|a| a.starts_with("machine"))
    {
        tracing::info!(call_sid, "call answered by machine");
    }

    let status: CallStatus = match update.call_status.parse() {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(call_sid, "ignoring status callback: {}", e);
            return Json(json!({ "status": "ok" }));
        }
    };

    if let Err(e) = state.sessions.set_status(call_sid, status) {
        tracing::debug!(call_sid, "status for untracked call: {}", e);
        return Json(json!({ "status": "ok" }));
    }

    if status.is_terminal() {
        let messages = state.sessions.history(call_sid).len();
        tracing::info!(call_sid, %status, messages, "call ended");
        if !state.retain_completed {
            state.sessions.remove(call_sid);
            tracing::info!(call_sid, "cleaned up call session");
        }
    }

    Json(json!({ "status": "ok" }))
}
