//! TwiML document builder.
//!
//! A [`VoiceResponse`] is an ordered list of verbs that Twilio executes top
//! to bottom. Rendering escapes every text node and attribute value, so
//! caller-provided text (echoed transcripts, custom greetings) cannot break
//! out of the document.

use quick_xml::escape::escape;
use std::fmt;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Method Twilio uses when following `action` and `<Redirect>` URLs. Every
/// webhook here is a POST route.
const WEBHOOK_METHOD: &str = "POST";

/// How long Twilio waits after the caller stops talking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechTimeout {
    Seconds(u32),
    Auto,
}

impl fmt::Display for SpeechTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{s}"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

/// `<Say>`: text spoken by Twilio's TTS.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Say {
    pub text: String,
    pub voice: Option<String>,
    pub language: Option<String>,
}

impl Say {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// `<Gather input="speech">`: capture caller speech and post the transcript
/// to `action`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gather {
    pub action: Option<String>,
    pub speech_timeout: Option<SpeechTimeout>,
    pub language: Option<String>,
    pub hints: Vec<String>,
    pub speech_model: Option<String>,
    pub enhanced: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    Say(Say),
    Gather(Gather),
    Redirect { url: String },
    Pause { length: u32 },
    Hangup,
}

/// A TwiML `<Response>` document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect { url: url.into() });
        self
    }

    pub fn pause(mut self, length: u32) -> Self {
        self.verbs.push(Verb::Pause { length });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Whether the document ends the call.
    pub fn hangs_up(&self) -> bool {
        self.verbs.iter().any(|v| matches!(v, Verb::Hangup))
    }

    /// Renders the document.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(XML_DECLARATION);
        out.push_str("<Response>");
        for verb in &self.verbs {
            write_verb(&mut out, verb);
        }
        out.push_str("</Response>");
        out
    }
}

impl fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn write_verb(out: &mut String, verb: &Verb) {
    match verb {
        Verb::Say(say) => {
            let mut attrs = Vec::new();
            if let Some(voice) = &say.voice {
                attrs.push(("voice", voice.clone()));
            }
            if let Some(language) = &say.language {
                attrs.push(("language", language.clone()));
            }
            write_element(out, "Say", &attrs, Some(&say.text));
        }
        Verb::Gather(gather) => {
            let mut attrs = vec![("input", "speech".to_string())];
            if let Some(action) = &gather.action {
                attrs.push(("action", action.clone()));
                attrs.push(("method", WEBHOOK_METHOD.to_string()));
            }
            if let Some(timeout) = gather.speech_timeout {
                attrs.push(("speechTimeout", timeout.to_string()));
            }
            if let Some(language) = &gather.language {
                attrs.push(("language", language.clone()));
            }
            if !gather.hints.is_empty() {
                attrs.push(("hints", gather.hints.join(", ")));
            }
            if let Some(model) = &gather.speech_model {
                attrs.push(("speechModel", model.clone()));
            }
            if gather.enhanced {
                attrs.push(("enhanced", "true".to_string()));
            }
            write_element(out, "Gather", &attrs, None);
        }
        Verb::Redirect { url } => {
            write_element(
                out,
                "Redirect",
                &[("method", WEBHOOK_METHOD.to_string())],
                Some(url),
            );
        }
        Verb::Pause { length } => {
            write_element(out, "Pause", &[("length", length.to_string())], None);
        }
        Verb::Hangup => write_element(out, "Hangup", &[], None),
    }
}

fn write_element(out: &mut String, name: &str, attrs: &[(&str, String)], body: Option<&str>) {
    out.push('<');
    out.push_str(name);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    match body {
        Some(text) => {
            out.push('>');
            out.push_str(&escape(text));
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        None => out.push_str("/>"),
    }
}
