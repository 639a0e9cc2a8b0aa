//! callrelay server library logic.

pub mod api;
pub mod api_calls;
pub mod api_sessions;
pub mod api_voice;
pub mod background;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use callrelay_session::SessionStore;
use callrelay_voice::{KeywordResponder, ReplyGenerator, TwilioClient, VoiceError};
use config::{Config, VoiceConfig};
use api_calls::CallSlots;
use middleware::RateLimiter;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// In-memory call sessions keyed by call SID.
    pub sessions: SessionStore,
    /// Twilio REST client.
    pub twilio: Arc<TwilioClient>,
    /// Produces the assistant's reply to each caller utterance.
    pub responder: Arc<dyn ReplyGenerator>,
    /// Externally reachable base URL used to build webhook URLs.
    pub public_url: String,
    /// Prompt and speech capture settings.
    pub voice: VoiceConfig,
    /// Keep sessions after their call ends.
    pub retain_completed: bool,
    /// Cap on live calls for `/make-call` (0 = unlimited).
    pub max_concurrent_calls: usize,
    /// Outbound calls being placed, counted against the cap.
    pub call_slots: CallSlots,
    /// Per-IP limiter for `/make-call`.
    pub rate_limiter: RateLimiter,
    /// `/make-call` requests allowed per IP per minute (0 = unlimited).
    pub make_call_per_minute: u32,
}

impl AppState {
    /// Builds state from configuration with the keyword responder.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError` if the HTTP client for Twilio cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, VoiceError> {
        Ok(Self {
            sessions: SessionStore::new(),
            twilio: Arc::new(TwilioClient::new(config.twilio.clone())?),
            responder: Arc::new(KeywordResponder::new()),
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            voice: config.voice.clone(),
            retain_completed: config.sessions.retain_completed,
            max_concurrent_calls: config.sessions.max_concurrent_calls,
            call_slots: CallSlots::new(),
            rate_limiter: RateLimiter::new(),
            make_call_per_minute: config.limits.make_call_per_minute,
        })
    }

    /// Replaces the reply generator.
    pub fn with_responder(mut self, responder: Arc<dyn ReplyGenerator>) -> Self {
        self.responder = responder;
        self
    }

    /// Absolute webhook URL for `path`, or `path` itself when no public URL
    /// is configured (Twilio resolves relative URLs against the request).
    pub fn webhook_url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }
}

/// Maximum request body size (64 KiB). Webhook and API payloads are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Twilio-originated webhooks; signatures are checked when enabled.
    let webhook_routes = Router::new()
        .route("/voice/incoming", post(api_voice::incoming_call_handler))
        .route("/voice/outbound", post(api_voice::outbound_call_handler))
        .route(
            "/voice/process-speech",
            post(api_voice::process_speech_handler),
        )
        .route("/call-status", post(api_voice::call_status_handler))
        .layer(axum::middleware::from_fn(
            middleware::twilio_signature_middleware,
        ));

    let call_routes = Router::new()
        .route("/make-call", post(api_calls::make_call_handler))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware));

    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/sessions", get(api_sessions::list_sessions_handler))
        .route(
            "/session/{call_sid}",
            get(api_sessions::get_session_handler),
        )
        .route(
            "/interrupt-call/{call_sid}",
            post(api_calls::interrupt_call_handler),
        )
        .merge(webhook_routes)
        .merge(call_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
