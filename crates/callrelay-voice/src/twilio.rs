//! Client for the Twilio Calls REST API.

use crate::config::TwilioConfig;
use crate::error::VoiceError;
use callrelay_types::CallStatus;
use serde::Deserialize;
use std::time::Duration;

/// Timeout for a single REST request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Status callback events requested for every outbound call.
const STATUS_CALLBACK_EVENTS: &[&str] = &["initiated", "ringing", "answered", "completed"];

/// Parameters for placing an outbound call.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub to: String,
    pub from: String,
    /// Webhook Twilio fetches TwiML from once the call is answered.
    pub url: String,
    pub status_callback: Option<String>,
    /// Twilio answering machine detection mode, e.g. `DetectMessageEnd`.
    pub machine_detection: Option<String>,
    pub record: bool,
}

/// The subset of Twilio's call resource we use.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    pub status: CallStatus,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioClient {
    config: TwilioConfig,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &TwilioConfig {
        &self.config
    }

    /// Caller ID for outbound calls.
    pub fn phone_number(&self) -> &str {
        &self.config.phone_number
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid,
            call_sid
        )
    }

    /// Places an outbound call.
    pub async fn create_call(&self, params: &CreateCall) -> Result<CallResource, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::NotConfigured);
        }

        let mut form: Vec<(&str, String)> = vec![
            ("To", params.to.clone()),
            ("From", params.from.clone()),
            ("Url", params.url.clone()),
            ("Method", "POST".to_string()),
        ];
        if let Some(callback) = &params.status_callback {
            form.push(("StatusCallback", callback.clone()));
            form.push(("StatusCallbackMethod", "POST".to_string()));
            for event in STATUS_CALLBACK_EVENTS {
                form.push(("StatusCallbackEvent", (*event).to_string()));
            }
        }
        if let Some(mode) = &params.machine_detection {
            form.push(("MachineDetection", mode.clone()));
        }
        if params.record {
            form.push(("Record", "true".to_string()));
        }

        tracing::debug!(to = %params.to, from = %params.from, "creating twilio call");
        self.post_form(&self.calls_url(), &form).await
    }

    /// Replaces the TwiML a live call is executing.
    pub async fn update_call_twiml(
        &self,
        call_sid: &str,
        twiml: &str,
    ) -> Result<CallResource, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::NotConfigured);
        }
        let form = [("Twiml", twiml.to_string())];
        self.post_form(&self.call_url(call_sid), &form).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<CallResource, VoiceError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<CallResource>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<TwilioErrorBody>(&body) {
            Ok(err) => (err.code, err.message.unwrap_or_else(|| body.clone())),
            Err(_) => (None, body),
        };
        tracing::warn!(status = status.as_u16(), ?code, %message, "twilio API request failed");
        Err(VoiceError::Twilio {
            status: status.as_u16(),
            code,
            message,
        })
    }
}
