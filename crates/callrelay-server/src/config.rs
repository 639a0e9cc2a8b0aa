//! Server configuration loading from file and environment variables.

use callrelay_voice::TwilioConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Twilio account and webhook settings.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Prompts, voices and speech capture settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Call session lifecycle.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Request limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL Twilio uses for webhooks
    /// (e.g. an ngrok tunnel). Empty means webhook URLs are emitted as
    /// relative paths.
    #[serde(default)]
    pub public_url: String,
}

/// What the relay says and how Twilio listens.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Greeting spoken when a call is answered.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Spoken when a `<Gather>` times out without input.
    #[serde(default = "default_no_input_prompt")]
    pub no_input_prompt: String,

    /// Spoken after a reply when the caller stays silent.
    #[serde(default = "default_follow_up_prompt")]
    pub follow_up_prompt: String,

    /// Twilio voice for the greeting and no-input prompt.
    #[serde(default = "default_greeting_voice")]
    pub greeting_voice: String,

    /// Twilio voice for generated replies.
    #[serde(default = "default_reply_voice")]
    pub reply_voice: String,

    /// Language of `<Say>` output.
    #[serde(default = "default_language")]
    pub language: String,

    /// Language Twilio's recognizer expects from the caller.
    #[serde(default = "default_language")]
    pub gather_language: String,

    /// Seconds of silence before Twilio finalizes speech. 0 means `auto`.
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout: u32,

    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    #[serde(default = "default_true")]
    pub enhanced: bool,

    /// Recognition hints passed to every `<Gather>`.
    #[serde(default = "default_hints")]
    pub hints: Vec<String>,
}

/// Call session lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Drop sessions older than this many seconds. 0 keeps them until restart.
    #[serde(default)]
    pub ttl_seconds: u64,

    /// Keep a session after its call reaches a terminal status.
    #[serde(default = "default_true")]
    pub retain_completed: bool,

    /// Refuse `/make-call` while this many calls are live. 0 disables the cap.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

/// Request limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// `/make-call` requests allowed per client IP per minute. 0 disables.
    #[serde(default = "default_make_call_per_minute")]
    pub make_call_per_minute: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callrelay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8000
}

fn default_greeting() -> String {
    "Hello! I'm your AI assistant. How can I help you today?".to_string()
}

fn default_no_input_prompt() -> String {
    "I didn't hear anything. Please try again or hang up.".to_string()
}

fn default_follow_up_prompt() -> String {
    "Is there anything else I can help you with?".to_string()
}

fn default_greeting_voice() -> String {
    "Polly.Joanna".to_string()
}

fn default_reply_voice() -> String {
    "Polly.Aditi".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_speech_timeout() -> u32 {
    3
}

fn default_speech_model() -> String {
    "experimental_conversations".to_string()
}

fn default_true() -> bool {
    true
}

fn default_hints() -> Vec<String> {
    ["help", "information", "question", "support"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_concurrent_calls() -> usize {
    100
}

fn default_make_call_per_minute() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            no_input_prompt: default_no_input_prompt(),
            follow_up_prompt: default_follow_up_prompt(),
            greeting_voice: default_greeting_voice(),
            reply_voice: default_reply_voice(),
            language: default_language(),
            gather_language: default_language(),
            speech_timeout: default_speech_timeout(),
            speech_model: default_speech_model(),
            enhanced: true,
            hints: default_hints(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 0,
            retain_completed: true,
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            make_call_per_minute: default_make_call_per_minute(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLRELAY_HOST` overrides `server.host`
/// - `CALLRELAY_PORT` overrides `server.port`
/// - `CALLRELAY_PUBLIC_URL` overrides `server.public_url`
/// - `CALLRELAY_TWILIO_ACCOUNT_SID` overrides `twilio.account_sid`
/// - `CALLRELAY_TWILIO_AUTH_TOKEN` overrides `twilio.auth_token`
/// - `CALLRELAY_TWILIO_PHONE_NUMBER` overrides `twilio.phone_number`
/// - `CALLRELAY_TWILIO_VALIDATE_SIGNATURES` overrides `twilio.validate_signatures`
/// - `CALLRELAY_SESSION_TTL_SECONDS` overrides `sessions.ttl_seconds`
/// - `CALLRELAY_MAX_CONCURRENT_CALLS` overrides `sessions.max_concurrent_calls`
/// - `CALLRELAY_LOG_LEVEL` overrides `logging.level`
/// - `CALLRELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    value == "true" || value == "1"
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = var("CALLRELAY_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("CALLRELAY_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(url) = var("CALLRELAY_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(sid) = var("CALLRELAY_TWILIO_ACCOUNT_SID") {
        config.twilio.account_sid = sid;
    }
    if let Some(token) = var("CALLRELAY_TWILIO_AUTH_TOKEN") {
        config.twilio.auth_token = token;
    }
    if let Some(number) = var("CALLRELAY_TWILIO_PHONE_NUMBER") {
        config.twilio.phone_number = number;
    }
    if let Some(validate) = var("CALLRELAY_TWILIO_VALIDATE_SIGNATURES") {
        config.twilio.validate_signatures = parse_bool(&validate);
    }
    if let Some(parsed) = var("CALLRELAY_SESSION_TTL_SECONDS").and_then(|v| v.parse().ok()) {
        config.sessions.ttl_seconds = parsed;
    }
    if let Some(parsed) = var("CALLRELAY_MAX_CONCURRENT_CALLS").and_then(|v| v.parse().ok()) {
        config.sessions.max_concurrent_calls = parsed;
    }
    if let Some(level) = var("CALLRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CALLRELAY_LOG_JSON") {
        config.logging.json = parse_bool(&json);
    }
}
