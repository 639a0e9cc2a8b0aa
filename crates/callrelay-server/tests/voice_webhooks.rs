mod common;

use axum::http::{header, StatusCode};
use callrelay_server::config::Config;
use callrelay_types::{CallDirection, CallSession, CallStatus, Role, TurnRecord};
use callrelay_voice::{Reply, ReplyGenerator};
use common::*;
use std::sync::{Arc, Mutex};

fn outbound_session(sid: &str) -> CallSession {
    CallSession::new(
        sid,
        "+15550001111",
        "+15550002222",
        CallDirection::Outbound,
        CallStatus::Ringing,
    )
}

#[tokio::test]
async fn outbound_answer_greets_and_gathers_speech() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA100"));

    let response = post_form(&state, "/voice/outbound", &[("CallSid", "CA100")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/xml"
    );

    let twiml = body_string(response).await;
    assert!(twiml.contains(r#"<Say voice="Polly.Joanna" language="en-US">Hello! I&apos;m your AI assistant."#));
    assert!(twiml.contains(
        r#"<Gather input="speech" action="https://relay.example/voice/process-speech" method="POST" speechTimeout="3""#
    ));
    assert!(twiml.contains("I didn&apos;t hear anything."));
    assert!(twiml.contains(
        r#"<Redirect method="POST">https://relay.example/voice/outbound</Redirect>"#
    ));

    assert_eq!(
        state.sessions.get("CA100").unwrap().status,
        CallStatus::InProgress
    );
}

#[tokio::test]
async fn outbound_answer_does_not_revive_ended_call() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA102"));
    state
        .sessions
        .set_status("CA102", CallStatus::Completed)
        .unwrap();

    let response = post_form(&state, "/voice/outbound", &[("CallSid", "CA102")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        state.sessions.get("CA102").unwrap().status,
        CallStatus::Completed
    );
}

#[tokio::test]
async fn outbound_answer_uses_initial_message() {
    let state = test_state(&test_config("http://unused"));
    let mut session = outbound_session("CA101");
    session.initial_message = Some("Hi, this is the pharmacy calling.".to_string());
    state.sessions.create(session);

    let twiml = body_string(post_form(&state, "/voice/outbound", &[("CallSid", "CA101")]).await).await;
    assert!(twiml.contains(">Hi, this is the pharmacy calling.</Say>"));
}

#[tokio::test]
async fn incoming_call_opens_session() {
    let state = test_state(&test_config("http://unused"));

    let response = post_form(
        &state,
        "/voice/incoming",
        &[
            ("CallSid", "CA200"),
            ("From", "+15557770000"),
            ("To", "+15550001111"),
            ("Direction", "inbound"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let twiml = body_string(response).await;
    assert!(twiml.contains(r#"<Gather input="speech""#));
    assert!(twiml.contains("https://relay.example/voice/incoming</Redirect>"));

    let session = state.sessions.get("CA200").unwrap();
    assert_eq!(session.from, "+15557770000");
    assert_eq!(session.direction, CallDirection::Inbound);
    assert!(session.conversation_history.is_empty());
}

#[tokio::test]
async fn relative_urls_without_public_url() {
    let mut config = test_config("http://unused");
    config.server.public_url = String::new();
    let state = test_state(&config);

    let twiml = body_string(post_form(&state, "/voice/incoming", &[("CallSid", "CA201")]).await).await;
    assert!(twiml.contains(r#"action="/voice/process-speech""#));
    assert!(twiml.contains(r#"<Redirect method="POST">/voice/incoming</Redirect>"#));
}

#[tokio::test]
async fn speech_turn_is_recorded_and_answered() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA300"));

    let response = post_form(
        &state,
        "/voice/process-speech",
        &[
            ("CallSid", "CA300"),
            ("SpeechResult", "Can you help me?"),
            ("Confidence", "0.92"),
            ("RecordingUrl", "https://api.twilio.com/recordings/RE1"),
            ("RecordingSid", "RE1"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let twiml = body_string(response).await;

    assert!(twiml.contains(r#"<Say voice="Polly.Aditi">I can help you"#));
    assert!(twiml.contains(r#"hints="help, information, question, support, goodbye, thanks""#));
    assert!(twiml.contains("Is there anything else I can help you with?"));
    assert!(twiml.contains("https://relay.example/voice/process-speech</Redirect>"));
    assert!(!twiml.contains("<Hangup/>"));

    let history = state.sessions.history("CA300");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::Caller);
    assert_eq!(history[0].content, "Can you help me?");
    assert_eq!(history[0].confidence, Some(0.92));
    assert_eq!(history[0].recording_sid.as_deref(), Some("RE1"));
    assert_eq!(history[1].role, Role::Assistant);
    assert!(history[1].content.starts_with("I can help you"));
}

#[tokio::test]
async fn goodbye_hangs_up_and_ends_session() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA301"));

    let twiml = body_string(
        post_form(
            &state,
            "/voice/process-speech",
            &[("CallSid", "CA301"), ("SpeechResult", "No that's all, goodbye")],
        )
        .await,
    )
    .await;

    assert!(twiml.contains("Have a great day! Goodbye.</Say><Hangup/></Response>"));
    assert!(!twiml.contains("<Gather"));

    let session = state.sessions.get("CA301").unwrap();
    assert!(session.is_ended());
    assert!(session.ended_at.is_some());
    assert_eq!(session.conversation_history.len(), 2);
}

#[tokio::test]
async fn silence_reprompts_without_caller_turn() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA302"));

    let twiml = body_string(
        post_form(&state, "/voice/process-speech", &[("CallSid", "CA302")]).await,
    )
    .await;
    assert!(twiml.contains("Sorry, I didn&apos;t catch that."));

    let history = state.sessions.history("CA302");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::Assistant);
}

#[tokio::test]
async fn echoed_speech_is_escaped() {
    let state = test_state(&test_config("http://unused"));

    let twiml = body_string(
        post_form(
            &state,
            "/voice/process-speech",
            &[("CallSid", "CA303"), ("SpeechResult", "</Say><Hangup/>")],
        )
        .await,
    )
    .await;
    assert!(twiml.contains("I heard you say: &lt;/Say&gt;&lt;Hangup/&gt;."));
    assert!(!twiml.contains("<Hangup/>"));
    // Unknown calls get a session on first speech.
    assert!(state.sessions.contains("CA303"));
}

#[tokio::test]
async fn unparseable_confidence_is_dropped() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA304"));

    post_form(
        &state,
        "/voice/process-speech",
        &[("CallSid", "CA304"), ("SpeechResult", "hello"), ("Confidence", "high")],
    )
    .await;
    assert_eq!(state.sessions.history("CA304")[0].confidence, None);
}

#[derive(Default)]
struct RecordingResponder {
    seen: Mutex<Vec<(String, usize)>>,
}

impl ReplyGenerator for RecordingResponder {
    fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Reply {
        self.seen
            .lock()
            .unwrap()
            .push((utterance.to_string(), history.len()));
        Reply {
            text: format!("turn {}", history.len() / 2 + 1),
            end_call: false,
        }
    }
}

#[tokio::test]
async fn responder_sees_prior_history() {
    let responder = Arc::new(RecordingResponder::default());
    let state = test_state(&test_config("http://unused")).with_responder(responder.clone());
    state.sessions.create(outbound_session("CA400"));

    for text in ["first", "second", "third"] {
        post_form(
            &state,
            "/voice/process-speech",
            &[("CallSid", "CA400"), ("SpeechResult", text)],
        )
        .await;
    }

    let seen = responder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("first".to_string(), 0),
            ("second".to_string(), 2),
            ("third".to_string(), 4)
        ]
    );
    let history = state.sessions.history("CA400");
    assert_eq!(history.len(), 6);
    assert_eq!(history[5].content, "turn 3");
}

#[tokio::test]
async fn terminal_status_keeps_session_by_default() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA500"));

    let response = post_form(
        &state,
        "/call-status",
        &[("CallSid", "CA500"), ("CallStatus", "completed"), ("CallDuration", "42")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let session = state.sessions.get("CA500").unwrap();
    assert_eq!(session.status, CallStatus::Completed);
    assert!(session.ended_at.is_some());
}

#[tokio::test]
async fn terminal_status_removes_session_when_not_retained() {
    let mut config: Config = test_config("http://unused");
    config.sessions.retain_completed = false;
    let state = test_state(&config);
    state.sessions.create(outbound_session("CA501"));

    post_form(
        &state,
        "/call-status",
        &[("CallSid", "CA501"), ("CallStatus", "ringing")],
    )
    .await;
    assert_eq!(state.sessions.get("CA501").unwrap().status, CallStatus::Ringing);

    post_form(
        &state,
        "/call-status",
        &[("CallSid", "CA501"), ("CallStatus", "no-answer")],
    )
    .await;
    assert!(!state.sessions.contains("CA501"));
}

#[tokio::test]
async fn unknown_status_and_call_are_ignored() {
    let state = test_state(&test_config("http://unused"));
    state.sessions.create(outbound_session("CA502"));

    let response = post_form(
        &state,
        "/call-status",
        &[("CallSid", "CA502"), ("CallStatus", "answered"), ("AnsweredBy", "machine_start")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.sessions.get("CA502").unwrap().status, CallStatus::Ringing);

    let response = post_form(
        &state,
        "/call-status",
        &[("CallSid", "CA_UNKNOWN"), ("CallStatus", "completed")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.sessions.contains("CA_UNKNOWN"));
}
