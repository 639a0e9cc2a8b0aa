use serde::{Deserialize, Serialize};
use std::fmt;

/// Production Twilio REST endpoint.
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

fn default_api_base() -> String {
    DEFAULT_TWILIO_API_BASE.to_string()
}

/// Twilio account credentials and endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    /// Caller ID used for outbound calls when the request names none.
    #[serde(default)]
    pub phone_number: String,
    /// Base URL of the REST API. Overridden in tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Reject webhooks whose `X-Twilio-Signature` does not verify.
    #[serde(default)]
    pub validate_signatures: bool,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base: default_api_base(),
            validate_signatures: false,
        }
    }
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .field("api_base", &self.api_base)
            .field("validate_signatures", &self.validate_signatures)
            .finish()
    }
}

impl TwilioConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            phone_number: phone_number.into(),
            ..Self::default()
        }
    }

    /// Points the client at a different REST endpoint.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Whether credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty()
    }
}
