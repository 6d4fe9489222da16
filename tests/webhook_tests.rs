//! End-to-end webhook tests with mocked external collaborators.
//!
//! Drives the real routers/handlers/pipeline; only the network-facing
//! collaborators (call control, STT, TTS, generation backend) are mocks.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use parking_lot::Mutex;
use tower::util::ServiceExt;

use switchboard::core::generation::{GenerationError, GenerationRequest, ResponseGenerator};
use switchboard::core::storage::{
    AgentProfile, CallRecord, CallStore, ConversationTurn, MemoryStore, Speaker,
};
use switchboard::core::stt::{SpeechToText, SttError};
use switchboard::core::telephony::{CallControl, CallControlError, RedirectTarget};
use switchboard::core::tts::{TextToSpeech, TtsError};
use switchboard::routes;
use switchboard::state::{AppState, Collaborators};
use switchboard::ServerConfig;

const AGENT_ID: &str = "agent-1";
const CALLER: &str = "+15550001111";

// ---------------------------------------------------------------------------
// Mock collaborators

struct MockCallControl {
    redirects: Mutex<Vec<(String, RedirectTarget)>>,
    recording: Bytes,
}

impl MockCallControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            redirects: Mutex::new(Vec::new()),
            recording: Bytes::from_static(b"RIFF fake wav"),
        })
    }

    fn redirect_count(&self) -> usize {
        self.redirects.lock().len()
    }

    fn redirect(&self, index: usize) -> (String, RedirectTarget) {
        self.redirects.lock()[index].clone()
    }
}

#[async_trait]
impl CallControl for MockCallControl {
    async fn redirect(
        &self,
        provider_call_id: &str,
        target: RedirectTarget,
    ) -> Result<(), CallControlError> {
        self.redirects
            .lock()
            .push((provider_call_id.to_string(), target));
        Ok(())
    }

    async fn fetch_recording(&self, _recording_url: &str) -> Result<Bytes, CallControlError> {
        Ok(self.recording.clone())
    }
}

struct MockStt {
    default: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicU32,
}

impl MockStt {
    fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self {
            default: text.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    fn push_failure(&self, message: &str) {
        self.script.lock().push_back(Err(message.to_string()));
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, _audio: Bytes) -> Result<String, SttError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(SttError::Request(message)),
            None => Ok(self.default.clone()),
        }
    }
}

struct MockTts;

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, _text: &str) -> Result<Bytes, TtsError> {
        Ok(Bytes::from_static(b"MP3DATA"))
    }
}

#[derive(Clone, Debug)]
struct CapturedGeneration {
    caller_history: Option<String>,
    user_text: String,
    history_len: usize,
}

struct MockGenerator {
    reply: String,
    delay: Option<Duration>,
    requests: Mutex<Vec<CapturedGeneration>>,
    ended_sessions: Mutex<Vec<String>>,
    summaries: AtomicU32,
}

impl MockGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: None,
            requests: Mutex::new(Vec::new()),
            ended_sessions: Mutex::new(Vec::new()),
            summaries: AtomicU32::new(0),
        })
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::replying_inner(reply)
        })
    }

    fn replying_inner(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: None,
            requests: Mutex::new(Vec::new()),
            ended_sessions: Mutex::new(Vec::new()),
            summaries: AtomicU32::new(0),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn last_request(&self) -> CapturedGeneration {
        self.requests.lock().last().cloned().expect("no requests")
    }

    fn ended_sessions(&self) -> Vec<String> {
        self.ended_sessions.lock().clone()
    }
}

#[async_trait]
impl ResponseGenerator for MockGenerator {
    async fn respond(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().push(CapturedGeneration {
            caller_history: request.caller_history.map(str::to_string),
            user_text: request.user_text.to_string(),
            history_len: request.history.len(),
        });
        Ok(self.reply.clone())
    }

    async fn summarize(&self, _turns: &[ConversationTurn]) -> Result<String, GenerationError> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        Ok("Caller asked about hours; agent answered.".to_string())
    }

    async fn end_session(&self, call_id: &str) -> Result<(), GenerationError> {
        self.ended_sessions.lock().push(call_id.to_string());
        Ok(())
    }

    async fn keepalive(&self, _call_id: &str) -> Result<(), GenerationError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test harness

struct Harness {
    app: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
    control: Arc<MockCallControl>,
    stt: Arc<MockStt>,
    generator: Arc<MockGenerator>,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "0.0.0.0".to_string(),
        port: 3001,
        app_base_url: "http://test.local".to_string(),
        backend_base_url: "http://backend.local".to_string(),
        generation_timeout_seconds: 30,
        twilio_account_sid: None,
        twilio_auth_token: None,
        twilio_api_base: "https://api.twilio.com".to_string(),
        elevenlabs_api_key: None,
        elevenlabs_voice_id: "voice-1".to_string(),
        max_turns: 20,
        hold_music_url: "http://hold.local/hold.mp3".to_string(),
        audio_cache_ttl_seconds: 300,
        idempotency_ttl_seconds: 120,
        session_ttl_seconds: 7200,
    }
}

fn harness_with(
    config: ServerConfig,
    stt: Arc<MockStt>,
    generator: Arc<MockGenerator>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.add_agent(AgentProfile {
        id: AGENT_ID.to_string(),
        name: "Acme Support".to_string(),
        context: "You answer questions about Acme.".to_string(),
    });
    let control = MockCallControl::new();

    let state = AppState::with_collaborators(
        config,
        Collaborators {
            store: store.clone(),
            call_control: control.clone(),
            stt: stt.clone(),
            tts: Arc::new(MockTts),
            generator: generator.clone(),
        },
    );
    let app = routes::webhooks::create_webhook_router().with_state(state.clone());

    Harness {
        app,
        state,
        store,
        control,
        stt,
        generator,
    }
}

fn harness() -> Harness {
    harness_with(
        test_config(),
        MockStt::returning("What are your hours?"),
        MockGenerator::replying("We're open nine to five."),
    )
}

async fn post_form(app: &Router, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes)
}

/// Start a call and return (call_id, greeting body).
async fn start_call(harness: &Harness) -> (String, String) {
    let (status, body) = post_form(
        &harness.app,
        &format!("/twilio/voice/{AGENT_ID}"),
        "CallSid=CA100&From=%2B15550001111&To=%2B15550002222",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let call_id = extract_call_id(&body);
    (call_id, body)
}

fn extract_call_id(greeting: &str) -> String {
    let start = greeting
        .find("call_id=")
        .expect("greeting must embed the callback URL")
        + "call_id=".len();
    greeting[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Poll an async condition until it holds (the pipeline runs detached).
async fn eventually<F, Fut>(mut condition: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s: {what}");
}

fn inline_doc(target: &RedirectTarget) -> &str {
    match target {
        RedirectTarget::Inline(doc) => doc,
        RedirectTarget::Url(url) => panic!("expected inline document, got URL {url}"),
    }
}

// ---------------------------------------------------------------------------
// Scenarios

#[tokio::test]
async fn test_incoming_call_unknown_agent_apologizes_and_hangs_up() {
    let h = harness();
    let (status, body) = post_form(
        &h.app,
        "/twilio/voice/no-such-agent",
        "CallSid=CA1&From=%2B15550001111",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("not available"));
    assert!(body.contains("<Hangup/>"));
    assert!(h.state.registry.is_empty());
}

#[tokio::test]
async fn test_incoming_call_greets_and_records() {
    let h = harness();
    let (call_id, greeting) = start_call(&h).await;

    assert!(greeting.contains("Acme Support"));
    assert!(greeting.contains("<Record"));
    assert!(greeting.contains(&format!(
        "http://test.local/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"
    )));
    assert_eq!(h.state.registry.len(), 1);
    assert_eq!(h.state.registry.resolve("CA100").as_deref(), Some(call_id.as_str()));
}

#[tokio::test]
async fn test_turn_webhook_without_recording_is_a_204_noop() {
    let h = harness();
    let (call_id, _) = start_call(&h).await;

    let (status, body) = post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100",
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(h.stt.call_count(), 0);
}

#[tokio::test]
async fn test_turn_webhook_without_call_id_is_an_error_document() {
    let h = harness();
    let (_, body) = post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;

    assert!(body.contains("Something went wrong"));
    assert!(body.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_full_turn_persists_alternating_turns_and_redirects_to_audio() {
    let h = harness();
    let (call_id, _) = start_call(&h).await;

    let (status, body) = post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;

    // Synchronous part: hold document, no recording instruction
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("One moment please."));
    assert!(body.contains("http://hold.local/hold.mp3"));
    assert!(!body.contains("<Record"));

    // Detached pipeline: caller turn, generation, agent turn, redirect
    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "pipeline redirect",
    )
    .await;

    let turns = h.store.turns(&call_id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].seq, 1);
    assert_eq!(turns[0].speaker, Speaker::Caller);
    assert_eq!(turns[0].text, "What are your hours?");
    assert_eq!(turns[0].audio_url.as_deref(), Some("http://rec.local/RE1"));
    assert_eq!(turns[1].seq, 2);
    assert_eq!(turns[1].speaker, Speaker::Agent);
    assert_eq!(turns[1].text, "We're open nine to five.");
    assert!(turns[1].audio_url.is_none());

    assert_eq!(h.generator.request_count(), 1);
    assert_eq!(h.generator.last_request().user_text, "What are your hours?");

    // The redirect points at the playback callback with fresh cached audio
    let (provider_call_id, target) = h.control.redirect(0);
    assert_eq!(provider_call_id, "CA100");
    let url = match target {
        RedirectTarget::Url(url) => url,
        RedirectTarget::Inline(doc) => panic!("expected URL redirect, got inline: {doc}"),
    };
    assert!(url.contains(&format!("/twilio/voice/{AGENT_ID}/callback?audio_id=")));
    assert!(url.contains(&format!("call_id={call_id}")));

    // The cached audio is servable (repeatedly) through the audio endpoint
    let audio_id_start = url.find("audio_id=").unwrap() + "audio_id=".len();
    let audio_id: String = url[audio_id_start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    for _ in 0..2 {
        let (status, bytes) = get(&h.app, &format!("/twilio/audio/{audio_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&bytes[..], b"MP3DATA");
    }
}

#[tokio::test]
async fn test_empty_transcript_reprompts_without_persisting_a_turn() {
    let h = harness_with(
        test_config(),
        MockStt::returning("   "),
        MockGenerator::replying("unused"),
    );
    let (call_id, _) = start_call(&h).await;

    post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;

    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "re-prompt redirect",
    )
    .await;

    let (_, target) = h.control.redirect(0);
    let doc = inline_doc(&target);
    assert!(doc.contains("I didn't catch that"));
    assert!(doc.contains(&format!("call_id={call_id}")));
    assert!(doc.contains("<Record"));

    // No caller turn, no generation call
    assert_eq!(h.store.turn_count(&call_id).await.unwrap(), 0);
    assert_eq!(h.generator.request_count(), 0);
}

#[tokio::test]
async fn test_duplicate_recording_webhook_processes_at_most_once() {
    let h = harness();
    let (call_id, _) = start_call(&h).await;
    let uri = format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}");
    let form = "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1";

    let (status1, body1) = post_form(&h.app, &uri, form).await;
    let (status2, body2) = post_form(&h.app, &uri, form).await;

    // Identical hold responses
    assert_eq!(status1, StatusCode::OK);
    assert_eq!(status2, StatusCode::OK);
    assert_eq!(body1, body2);

    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "pipeline redirect",
    )
    .await;
    // Give a would-be duplicate pipeline time to appear
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.stt.call_count(), 1);
    assert_eq!(h.control.redirect_count(), 1);
    assert_eq!(h.store.turn_count(&call_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_turn_budget_reached_issues_closing_statement() {
    let mut config = test_config();
    config.max_turns = 1; // budget of 2 persisted turns
    let h = harness_with(
        config,
        MockStt::returning("And another thing!"),
        MockGenerator::replying("unused"),
    );
    let (call_id, _) = start_call(&h).await;

    // One full exchange already happened
    for (seq, speaker, text) in [
        (1u32, Speaker::Caller, "Hello?"),
        (2, Speaker::Agent, "Hi there."),
    ] {
        h.store
            .insert_turn(ConversationTurn {
                id: format!("seed-{seq}"),
                call_id: call_id.clone(),
                seq,
                speaker,
                text: text.to_string(),
                audio_url: None,
            })
            .await
            .unwrap();
    }

    post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE9",
    )
    .await;

    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "closing redirect",
    )
    .await;

    let (_, target) = h.control.redirect(0);
    let doc = inline_doc(&target);
    assert!(doc.contains("Thank you for the conversation"));
    assert!(doc.contains("<Hangup/>"));
    assert!(!doc.contains("<Record"));
    // The caller's final words were still persisted; no reply was generated
    assert_eq!(h.store.turn_count(&call_id).await.unwrap(), 3);
    assert_eq!(h.generator.request_count(), 0);
}

#[tokio::test]
async fn test_generation_timeout_triggers_recovery_reprompt() {
    let mut config = test_config();
    config.generation_timeout_seconds = 0;
    let h = harness_with(
        config,
        MockStt::returning("What are your hours?"),
        MockGenerator::slow("too late", Duration::from_secs(3600)),
    );
    let (call_id, _) = start_call(&h).await;

    post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;

    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "recovery redirect",
    )
    .await;

    let (_, target) = h.control.redirect(0);
    let doc = inline_doc(&target);
    assert!(doc.contains("I'm sorry, I had trouble processing that"));
    assert!(doc.contains("<Record"));

    // Caller turn persisted before the backend call; no agent turn after
    let turns = h.store.turns(&call_id).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].speaker, Speaker::Caller);
}

#[tokio::test]
async fn test_repeated_failures_eventually_hang_up() {
    let h = harness();
    h.stt.push_failure("stt down");
    h.stt.push_failure("stt down");
    h.stt.push_failure("stt down");
    let (call_id, _) = start_call(&h).await;

    for n in 1..=3u32 {
        post_form(
            &h.app,
            &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
            &format!("CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE{n}"),
        )
        .await;
        let control = h.control.clone();
        eventually(
            || {
                let control = control.clone();
                let n = n as usize;
                async move { control.redirect_count() >= n }
            },
            "recovery redirect",
        )
        .await;
    }

    let (_, first) = h.control.redirect(0);
    let (_, second) = h.control.redirect(1);
    let (_, third) = h.control.redirect(2);
    assert!(inline_doc(&first).contains("Could you try again?"));
    assert!(inline_doc(&second).contains("Could you try again?"));
    // Third consecutive failure stops the re-prompt loop
    let final_doc = inline_doc(&third);
    assert!(final_doc.contains("technical difficulties"));
    assert!(final_doc.contains("<Hangup/>"));
    assert!(!final_doc.contains("<Record"));
}

#[tokio::test]
async fn test_first_turn_consumes_prefetched_caller_history() {
    let h = harness();

    // A prior completed call from the same number
    h.store
        .insert_call(CallRecord {
            id: "old-call".to_string(),
            agent_id: AGENT_ID.to_string(),
            caller: CALLER.to_string(),
            started_at: chrono::Utc::now() - chrono::Duration::days(1),
            duration_seconds: 80,
            summary: Some("asked about returns".to_string()),
        })
        .await
        .unwrap();

    let (call_id, _) = start_call(&h).await;
    post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;

    let generator = h.generator.clone();
    eventually(
        || {
            let generator = generator.clone();
            async move { generator.request_count() >= 1 }
        },
        "generation request",
    )
    .await;

    let captured = h.generator.last_request();
    let history = captured.caller_history.expect("first turn carries history");
    assert!(history.contains("Previous calls from this number"));
    assert!(history.contains("asked about returns"));
    // The transcript so far contains the just-persisted caller turn
    assert_eq!(captured.history_len, 1);
}

#[tokio::test]
async fn test_callback_endpoint_plays_audio_then_records() {
    let h = harness();
    let (_, body) = post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/callback?audio_id=a1&call_id=c1"),
        "CallSid=CA100",
    )
    .await;

    assert!(body.contains("<Play>http://test.local/twilio/audio/a1</Play>"));
    assert!(body.contains(&format!(
        "action=\"http://test.local/twilio/voice/{AGENT_ID}/respond?call_id=c1\""
    )));
}

#[tokio::test]
async fn test_audio_endpoint_returns_404_when_absent() {
    let h = harness();
    let (status, _) = get(&h.app, "/twilio/audio/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_terminal_status_is_ignored() {
    let h = harness();
    let (_, _) = start_call(&h).await;

    let (status, _) = post_form(
        &h.app,
        "/twilio/status",
        "CallSid=CA100&CallStatus=ringing",
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(h.state.registry.len(), 1);
}

#[tokio::test]
async fn test_completed_status_tears_down_and_summarizes() {
    let h = harness();
    let (call_id, _) = start_call(&h).await;

    // One full exchange, then the provider reports completion
    post_form(
        &h.app,
        &format!("/twilio/voice/{AGENT_ID}/respond?call_id={call_id}"),
        "CallSid=CA100&RecordingUrl=http%3A%2F%2Frec.local%2FRE1",
    )
    .await;
    let control = h.control.clone();
    eventually(
        || {
            let control = control.clone();
            async move { control.redirect_count() >= 1 }
        },
        "pipeline redirect",
    )
    .await;

    let (status, _) = post_form(
        &h.app,
        "/twilio/status",
        "CallSid=CA100&CallStatus=completed",
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Registry entries are gone immediately
    assert!(h.state.registry.is_empty());
    assert!(h.state.registry.resolve("CA100").is_none());

    // Backend notified and transcript summarized in the background
    let generator = h.generator.clone();
    let expected_call_id = call_id.clone();
    eventually(
        || {
            let generator = generator.clone();
            let expected = expected_call_id.clone();
            async move { generator.ended_sessions().contains(&expected) }
        },
        "end-session notification",
    )
    .await;

    let store = h.store.clone();
    eventually(
        || {
            let store = store.clone();
            async move {
                store
                    .recent_calls(AGENT_ID, CALLER, 5)
                    .await
                    .unwrap()
                    .iter()
                    .any(|c| c.summary.is_some())
            }
        },
        "summary persisted",
    )
    .await;
}

#[tokio::test]
async fn test_failed_status_skips_summarization() {
    let h = harness();
    let (_, _) = start_call(&h).await;

    post_form(&h.app, "/twilio/status", "CallSid=CA100&CallStatus=failed").await;

    assert!(h.state.registry.is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.generator.summaries.load(Ordering::SeqCst), 0);
    // The call record stays unfinished, so it never surfaces as history
    assert!(h.store.recent_calls(AGENT_ID, CALLER, 5).await.unwrap().is_empty());
}
