use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use callrelay_voice::signature::{validate_signature, SIGNATURE_HEADER};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

/// Largest webhook body buffered for signature validation.
const MAX_SIGNED_BODY_BYTES: usize = 64 * 1024;

/// In-memory rate limiter state.
///
/// Uses a simple fixed window counter per client IP.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the request is allowed.
    ///
    /// Returns `true` if allowed, `false` if limit exceeded.
    pub fn check(&self, key: IpAddr, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Evict only expired windows so active limits survive cleanup.
        if state.len() > 10000 {
            state.retain(|_, (_, start)| now.duration_since(*start) <= Duration::from_secs(60));
        }

        let (count, start) = state.entry(key).or_insert((0, now));

        if now.duration_since(*start) > Duration::from_secs(60) {
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn app_state(req: &Request<Body>) -> Result<Arc<AppState>, StatusCode> {
    req.extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Rate limiting middleware for call placement.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = app_state(&req)?;
    if state.make_call_per_minute == 0 {
        return Ok(next.run(req).await);
    }

    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() else {
        // The server is always started with connect info; its absence is a
        // wiring bug.
        tracing::error!("rate limiter has no client address");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    if !state.rate_limiter.check(addr.ip(), state.make_call_per_minute) {
        tracing::warn!(client = %addr.ip(), "rate limit exceeded for call placement");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response.headers_mut().insert(
            header::RETRY_AFTER,
            axum::http::HeaderValue::from_static("60"),
        );
        return Ok(response);
    }

    Ok(next.run(req).await)
}

/// Rejects Twilio webhooks whose `X-Twilio-Signature` does not verify.
///
/// A no-op unless `twilio.validate_signatures` is enabled. The signed URL is
/// the configured public URL plus the request path and query, falling back
/// to `https://{Host}` when no public URL is set.
pub async fn twilio_signature_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let state = app_state(&req)?;
    let config = state.twilio.config();
    if !config.validate_signatures {
        return Ok(next.run(req).await);
    }

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!(path = %req.uri().path(), "webhook missing twilio signature");
            StatusCode::FORBIDDEN
        })?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let base = if state.public_url.is_empty() {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        format!("https://{host}")
    } else {
        state.public_url.clone()
    };
    let url = format!("{base}{path_and_query}");

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_SIGNED_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
    let params: Vec<(String, String)> = url::form_urlencoded::parse(&bytes)
        .into_owned()
        .collect();

    if !validate_signature(&config.auth_token, &url, &params, &signature) {
        tracing::warn!(%url, "rejected webhook with invalid twilio signature");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
