//! Call-control document builders.
//!
//! Every webhook response and out-of-band redirect carries one of these
//! documents; they tell the telephony provider what to do next on the live
//! call (speak, play audio, record, hang up). Builders take fully formed
//! callback URLs so this module stays free of configuration concerns.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Recording parameters shared by every `<Record>` we issue: 30s max
/// utterance, 3s of trailing silence ends the take, no beep.
const RECORD_ATTRS: &str = r#"maxLength="30" timeout="3" playBeep="false""#;

/// A call-control document served as `text/xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.0).into_response()
    }
}

/// Wrap a body fragment in the XML envelope.
pub fn document(body: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  {body}\n</Response>")
}

fn record_fragment(action_url: &str) -> String {
    format!(
        "<Record {RECORD_ATTRS} action=\"{}\" />\n  <Say voice=\"alice\">Goodbye!</Say>\n  <Hangup/>",
        escape_xml(action_url)
    )
}

/// Initial greeting: speak, then record the caller's first utterance.
pub fn greeting(agent_name: &str, respond_url: &str) -> Twiml {
    let body = format!(
        "<Say voice=\"alice\">Hello! You've reached {}. How can I help you today?</Say>\n  {}",
        escape_xml(agent_name),
        record_fragment(respond_url)
    );
    Twiml(document(&body))
}

/// Immediate turn-webhook response: keeps the caller on the line with
/// audio while the pipeline runs. Deliberately carries no `<Record>`; the
/// next recording instruction arrives via an out-of-band redirect.
pub fn hold(hold_music_url: &str) -> Twiml {
    let body = format!(
        "<Say voice=\"alice\">One moment please.</Say>\n  <Play loop=\"0\">{}</Play>",
        escape_xml(hold_music_url)
    );
    Twiml(document(&body))
}

/// Re-prompt after an empty transcription. A normal branch, not an error.
pub fn reprompt(respond_url: &str) -> Twiml {
    let body = format!(
        "<Say voice=\"alice\">I didn't catch that. Could you please repeat?</Say>\n  {}",
        record_fragment(respond_url)
    );
    Twiml(document(&body))
}

/// Recovery document after a pipeline failure: apology plus a fresh
/// recording prompt, so failure is always speech, never silence.
pub fn recovery(respond_url: &str) -> Twiml {
    let body = format!(
        "<Say voice=\"alice\">I'm sorry, I had trouble processing that. Could you try again?</Say>\n  {}",
        record_fragment(respond_url)
    );
    Twiml(document(&body))
}

/// Play a cached reply, then record the next utterance.
pub fn play_and_record(audio_url: &str, respond_url: &str) -> Twiml {
    let body = format!(
        "<Play>{}</Play>\n  {}",
        escape_xml(audio_url),
        record_fragment(respond_url)
    );
    Twiml(document(&body))
}

/// Closing statement when the turn budget is exhausted.
pub fn closing() -> Twiml {
    Twiml(document(
        "<Say voice=\"alice\">Thank you for the conversation. Goodbye!</Say>\n  <Hangup/>",
    ))
}

/// Spoken goodbye + hangup when repeated recovery attempts have failed.
pub fn goodbye_hangup() -> Twiml {
    Twiml(document(
        "<Say voice=\"alice\">I'm sorry, we're having technical difficulties. Please call back later. Goodbye!</Say>\n  <Hangup/>",
    ))
}

/// Apology + hangup when the target agent cannot be identified.
pub fn agent_unavailable() -> Twiml {
    Twiml(document(
        "<Say>Sorry, this agent is not available.</Say>\n  <Hangup/>",
    ))
}

/// Generic error document for malformed webhook requests.
pub fn error_hangup() -> Twiml {
    Twiml(document(
        "<Say voice=\"alice\">Something went wrong. Goodbye!</Say>\n  <Hangup/>",
    ))
}

/// Escape text destined for XML element content or attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
