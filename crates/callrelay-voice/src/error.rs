use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("twilio is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("twilio API error ({status}): {message}")]
    Twilio {
        status: u16,
        code: Option<i64>,
        message: String,
    },
}
