//! Call session and turn record definitions.
//!
//! A `CallSession` is the in-memory record of one phone call, keyed by the
//! call SID Twilio issues. Its `conversation_history` is append-only.

use crate::{CallDirection, CallStatus, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One utterance in a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Twilio's speech recognition confidence (0.0..=1.0), caller turns only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_sid: Option<String>,
}

impl TurnRecord {
    /// A caller utterance stamped with the current time.
    pub fn caller(content: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            role: Role::Caller,
            content: content.into(),
            timestamp: Utc::now(),
            confidence,
            recording_url: None,
            recording_sid: None,
        }
    }

    /// A generated reply stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            confidence: None,
            recording_url: None,
            recording_sid: None,
        }
    }

    /// Attaches the recording Twilio made of this utterance.
    pub fn with_recording(mut self, url: Option<String>, sid: Option<String>) -> Self {
        self.recording_url = url;
        self.recording_sid = sid;
        self
    }
}

/// The state of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub call_sid: String,
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Custom greeting supplied when the call was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<TurnRecord>,
}

impl CallSession {
    /// Creates an empty session that started now.
    pub fn new(
        call_sid: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        direction: CallDirection,
        status: CallStatus,
    ) -> Self {
        Self {
            call_sid: call_sid.into(),
            from: from.into(),
            to: to.into(),
            direction,
            status,
            started_at: Utc::now(),
            ended_at: None,
            initial_message: None,
            conversation_history: Vec::new(),
        }
    }

    /// Whether the call has reached a terminal status.
    pub fn is_ended(&self) -> bool {
        self.status.is_terminal()
    }

    /// Condensed view for listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            to: self.to.clone(),
            from: self.from.clone(),
            started_at: self.started_at,
            status: self.status,
            message_count: self.conversation_history.len(),
        }
    }
}

/// Listing entry returned by `GET /sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub to: String,
    pub from: String,
    pub started_at: DateTime<Utc>,
    pub status: CallStatus,
    pub message_count: usize,
}
