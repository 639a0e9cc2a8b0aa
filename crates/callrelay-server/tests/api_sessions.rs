mod common;

use axum::http::StatusCode;
use callrelay_types::{CallDirection, CallSession, CallStatus, TurnRecord};
use common::*;

fn seed(state: &callrelay_server::AppState) {
    state.sessions.create(CallSession::new(
        "CA1",
        "+15550001111",
        "+15550002222",
        CallDirection::Outbound,
        CallStatus::InProgress,
    ));
    state.sessions.create(CallSession::new(
        "CA2",
        "+15557770000",
        "+15550001111",
        CallDirection::Inbound,
        CallStatus::Completed,
    ));
    state
        .sessions
        .append_turn("CA1", TurnRecord::caller("hello", Some(0.8)))
        .unwrap();
    state
        .sessions
        .append_turn("CA1", TurnRecord::assistant("Hello! How can I help you today?"))
        .unwrap();
}

#[tokio::test]
async fn lists_session_summaries() {
    let state = test_state(&test_config("http://unused"));
    seed(&state);

    let response = get(&state, "/sessions").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["active_sessions"], 2);
    assert_eq!(body["in_progress"], 1);
    assert_eq!(body["sessions"]["CA1"]["to"], "+15550002222");
    assert_eq!(body["sessions"]["CA1"]["status"], "in-progress");
    assert_eq!(body["sessions"]["CA1"]["message_count"], 2);
    assert_eq!(body["sessions"]["CA2"]["status"], "completed");
    assert_eq!(body["sessions"]["CA2"]["message_count"], 0);
    // Summaries leave the transcript out.
    assert!(body["sessions"]["CA1"].get("conversation_history").is_none());
}

#[tokio::test]
async fn empty_session_list() {
    let state = test_state(&test_config("http://unused"));
    let body = body_json(get(&state, "/sessions").await).await;
    assert_eq!(body["active_sessions"], 0);
    assert!(body["sessions"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn session_detail_includes_transcript() {
    let state = test_state(&test_config("http://unused"));
    seed(&state);

    let response = get(&state, "/session/CA1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["call_sid"], "CA1");
    assert_eq!(body["direction"], "outbound");
    let history = body["conversation_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "hello");
    assert_eq!(history[1]["role"], "assistant");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let state = test_state(&test_config("http://unused"));

    let response = get(&state, "/session/CAnope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "session not found");
}

#[tokio::test]
async fn root_reports_service_status() {
    let state = test_state(&test_config("http://unused"));
    seed(&state);

    let body = body_json(get(&state, "/").await).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Twilio voice relay is running");
    assert_eq!(body["active_sessions"], 2);
    assert_eq!(body["public_url"], PUBLIC_URL);
}

#[tokio::test]
async fn health_reports_twilio_configuration() {
    let state = test_state(&test_config("http://unused"));
    let body = body_json(get(&state, "/health").await).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["twilio_configured"], true);
    assert!(body["version"].is_string());

    let mut config = test_config("http://unused");
    config.twilio.auth_token = String::new();
    let body = body_json(get(&test_state(&config), "/health").await).await;
    assert_eq!(body["twilio_configured"], false);
}
