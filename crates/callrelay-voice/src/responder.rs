//! Reply generation for caller utterances.
//!
//! [`ReplyGenerator`] is the seam where a language model would plug in.
//! The shipped implementation, [`KeywordResponder`], picks a canned reply by
//! whole-word keyword matching.

use callrelay_types::TurnRecord;
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

const GOODBYE_PHRASES: &[&str] = &[
    "goodbye",
    "bye",
    "thank you",
    "thanks",
    "that's all",
    "nothing else",
];
const GREETING_WORDS: &[&str] = &["hello", "hi", "hey"];

pub const FAREWELL: &str = "Thank you for calling. Have a great day! Goodbye.";
pub const REPROMPT: &str = "Sorry, I didn't catch that. Could you say it again?";

/// What to say next, and whether the call should end after saying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub end_call: bool,
}

impl Reply {
    fn continue_with(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_call: false,
        }
    }

    fn end_with(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_call: true,
        }
    }
}

/// Produces the assistant's reply to a caller utterance.
///
/// `history` holds the call's turns before this utterance.
pub trait ReplyGenerator: Send + Sync {
    fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Reply;
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Rule-based replies.
///
/// Rules are checked in order: goodbye phrases, `help`, `weather`, `time`,
/// `date`, greetings. Anything else gets a fallback that echoes the
/// utterance.
#[derive(Clone)]
pub struct KeywordResponder {
    clock: Clock,
}

impl fmt::Debug for KeywordResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordResponder").finish_non_exhaustive()
    }
}

impl Default for KeywordResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordResponder {
    /// Uses the server's local time for time and date replies.
    pub fn new() -> Self {
        Self::with_clock(|| Local::now().naive_local())
    }

    pub fn with_clock(clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }
}

impl ReplyGenerator for KeywordResponder {
    fn reply(&self, utterance: &str, _history: &[TurnRecord]) -> Reply {
        let words = tokenize(utterance);
        if words.is_empty() {
            return Reply::continue_with(REPROMPT);
        }

        if GOODBYE_PHRASES.iter().any(|p| contains_phrase(&words, p)) {
            return Reply::end_with(FAREWELL);
        }

        let has = |word: &str| words.iter().any(|w| w == word);

        let text = if has("help") {
            "I can help you with information, answer questions, or support your needs. \
             What would you like to know?"
                .to_string()
        } else if has("weather") {
            "I'm an AI assistant. For weather information, please check a weather website \
             or ask a weather service."
                .to_string()
        } else if has("time") {
            format!("The current time is {}.", (self.clock)().format("%I:%M %p"))
        } else if has("date") {
            format!("Today is {}.", (self.clock)().format("%A, %B %d, %Y"))
        } else if GREETING_WORDS.iter().any(|&g| has(g)) {
            "Hello! How can I help you today?".to_string()
        } else {
            format!(
                "I heard you say: {}. I'm here to help. Could you please give more details \
                 or ask a specific question?",
                utterance.trim()
            )
        };

        Reply::continue_with(text)
    }
}

/// Lowercased words, keeping apostrophes so "that's" stays one token.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}
