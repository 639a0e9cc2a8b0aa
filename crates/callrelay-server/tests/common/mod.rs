#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use callrelay_server::{app, config::Config, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::ServiceExt; // for oneshot

pub const PUBLIC_URL: &str = "https://relay.example";

/// Configuration with Twilio pointed at `api_base`.
pub fn test_config(api_base: &str) -> Config {
    let mut config = Config::default();
    config.server.public_url = PUBLIC_URL.to_string();
    config.twilio.account_sid = "ACtest".to_string();
    config.twilio.auth_token = "token".to_string();
    config.twilio.phone_number = "+15550001111".to_string();
    config.twilio.api_base = api_base.to_string();
    config
}

pub fn test_state(config: &Config) -> AppState {
    AppState::from_config(config).unwrap()
}

pub fn client_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 12345))
}

pub async fn send(state: &AppState, mut request: Request<Body>) -> Response {
    request.extensions_mut().insert(ConnectInfo(client_addr()));
    app(state.clone()).oneshot(request).await.unwrap()
}

pub async fn post_form(state: &AppState, uri: &str, fields: &[(&str, &str)]) -> Response {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    send(state, request).await
}

pub async fn post_json(state: &AppState, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(state, request).await
}

pub async fn get(state: &AppState, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(state, request).await
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Destination the mock Twilio takes `SLOW_CREATE_DELAY` to dial.
pub const SLOW_NUMBER: &str = "+15558888888";
pub const SLOW_CREATE_DELAY: std::time::Duration = std::time::Duration::from_millis(300);

/// Requests received by the mock Twilio API.
pub type Requests = Arc<Mutex<Vec<(String, String)>>>;

async fn mock_create_call(
    State(requests): State<Requests>,
    Path(account): Path<String>,
    body: String,
) -> Response {
    requests
        .lock()
        .unwrap()
        .push((format!("/Accounts/{account}/Calls.json"), body.clone()));

    if body.contains(&format!("To={}", urlencode(SLOW_NUMBER))) {
        tokio::time::sleep(SLOW_CREATE_DELAY).await;
    }

    if body.contains("To=%2B15559999999") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 21215, "message": "Geo permission denied", "status": 400 })),
        )
            .into_response();
    }

    let n = requests.lock().unwrap().len();
    (
        StatusCode::CREATED,
        Json(json!({ "sid": format!("CAmock{n:04}"), "status": "queued" })),
    )
        .into_response()
}

async fn mock_update_call(
    State(requests): State<Requests>,
    Path((account, file)): Path<(String, String)>,
    body: String,
) -> Json<Value> {
    requests
        .lock()
        .unwrap()
        .push((format!("/Accounts/{account}/Calls/{file}"), body));
    Json(json!({ "sid": file.trim_end_matches(".json"), "status": "in-progress" }))
}

/// Starts a stand-in for the Twilio REST API on an ephemeral port.
pub async fn spawn_mock_twilio() -> (String, Requests) {
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route(
            "/2010-04-01/Accounts/{account}/Calls.json",
            post(mock_create_call),
        )
        .route(
            "/2010-04-01/Accounts/{account}/Calls/{file}",
            post(mock_update_call),
        )
        .with_state(requests.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), requests)
}
