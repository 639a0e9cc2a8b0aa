//! Voice plumbing for callrelay.
//!
//! Twilio does the heavy lifting on a call: speech recognition, signaling
//! and `<Say>` playback all happen on the platform. This crate covers our
//! side of that contract:
//!
//! - [`twiml`] builds the TwiML documents returned from webhooks.
//! - [`twilio`] talks to the Calls REST API to place and redirect calls.
//! - [`signature`] verifies `X-Twilio-Signature` on incoming webhooks.
//! - [`responder`] turns a caller utterance into a reply.

pub mod config;
pub mod error;
pub mod responder;
pub mod signature;
pub mod twilio;
pub mod twiml;

pub use config::{TwilioConfig, DEFAULT_TWILIO_API_BASE};
pub use error::VoiceError;
pub use responder::{KeywordResponder, Reply, ReplyGenerator};
pub use twilio::{CallResource, CreateCall, TwilioClient};
pub use twiml::{Gather, Say, SpeechTimeout, VoiceResponse};
