//! Application state shared across handlers and background tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ServerConfig;
use crate::core::audio_cache::AudioCache;
use crate::core::generation::{
    GenerationError, GenerationRequest, HttpGenerator, ResponseGenerator,
};
use crate::core::idempotency::IdempotencyGuard;
use crate::core::registry::CallRegistry;
use crate::core::storage::{CallStore, ConversationTurn, MemoryStore};
use crate::core::stt::{ElevenLabsStt, SpeechToText, SttError};
use crate::core::telephony::{CallControl, CallControlError, RedirectTarget, TwilioCallControl};
use crate::core::tts::{ElevenLabsTts, TextToSpeech, TtsError};

/// External collaborator handles, bundled so tests can swap in mocks.
pub struct Collaborators {
    pub store: Arc<dyn CallStore>,
    pub call_control: Arc<dyn CallControl>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub generator: Arc<dyn ResponseGenerator>,
}

/// Application state that can be shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<CallRegistry>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub audio_cache: Arc<AudioCache>,
    pub store: Arc<dyn CallStore>,
    pub call_control: Arc<dyn CallControl>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub generator: Arc<dyn ResponseGenerator>,
}

impl AppState {
    /// Build production state from configuration. Collaborators without
    /// credentials get stub implementations that fail loudly when touched,
    /// so a partially configured server still starts and serves health
    /// checks.
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let call_control: Arc<dyn CallControl> = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
        ) {
            (Some(sid), Some(token)) => Arc::new(TwilioCallControl::new(
                sid.clone(),
                token.clone(),
                config.twilio_api_base.clone(),
            )),
            _ => {
                tracing::warn!("Twilio credentials missing; call control is disabled");
                Arc::new(Unconfigured)
            }
        };

        let (stt, tts): (Arc<dyn SpeechToText>, Arc<dyn TextToSpeech>) =
            match &config.elevenlabs_api_key {
                Some(key) => (
                    Arc::new(ElevenLabsStt::new(key.clone())),
                    Arc::new(ElevenLabsTts::new(
                        key.clone(),
                        config.elevenlabs_voice_id.clone(),
                    )),
                ),
                None => {
                    tracing::warn!("ELEVENLABS_API_KEY missing; speech providers are disabled");
                    (Arc::new(Unconfigured), Arc::new(Unconfigured))
                }
            };

        let generator = Arc::new(HttpGenerator::new(config.backend_base_url.clone()));

        Self::with_collaborators(
            config,
            Collaborators {
                store: Arc::new(MemoryStore::new()),
                call_control,
                stt,
                tts,
                generator,
            },
        )
    }

    /// Assemble state from explicit collaborators (tests, alternate
    /// wiring).
    pub fn with_collaborators(config: ServerConfig, collaborators: Collaborators) -> Arc<Self> {
        let idempotency = Arc::new(IdempotencyGuard::new(config.idempotency_ttl()));
        let audio_cache = Arc::new(AudioCache::new(config.audio_cache_ttl()));
        Arc::new(Self {
            config,
            registry: Arc::new(CallRegistry::new()),
            idempotency,
            audio_cache,
            store: collaborators.store,
            call_control: collaborators.call_control,
            stt: collaborators.stt,
            tts: collaborators.tts,
            generator: collaborators.generator,
        })
    }

    /// Start the periodic sweepers: stale idempotency markers and call
    /// sessions whose terminal webhook never arrived. The audio cache
    /// sweeps itself via its TTL.
    pub fn spawn_maintenance_tasks(self: &Arc<Self>) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = state.idempotency.sweep();
                let reaped = state.registry.reap_expired(state.config.session_ttl());
                if swept > 0 || reaped > 0 {
                    tracing::debug!(swept, reaped, "Maintenance sweep");
                }
            }
        });
    }
}

/// Stub collaborator used when credentials are absent. Every call fails
/// with a configuration error.
struct Unconfigured;

#[async_trait]
impl CallControl for Unconfigured {
    async fn redirect(&self, _: &str, _: RedirectTarget) -> Result<(), CallControlError> {
        Err(CallControlError::NotConfigured)
    }

    async fn fetch_recording(&self, _: &str) -> Result<Bytes, CallControlError> {
        Err(CallControlError::NotConfigured)
    }
}

#[async_trait]
impl SpeechToText for Unconfigured {
    async fn transcribe(&self, _: Bytes) -> Result<String, SttError> {
        Err(SttError::NotConfigured)
    }
}

#[async_trait]
impl TextToSpeech for Unconfigured {
    async fn synthesize(&self, _: &str) -> Result<Bytes, TtsError> {
        Err(TtsError::NotConfigured)
    }
}

#[async_trait]
impl ResponseGenerator for Unconfigured {
    async fn respond(&self, _: GenerationRequest<'_>) -> Result<String, GenerationError> {
        Err(GenerationError::Request("not configured".to_string()))
    }

    async fn summarize(&self, _: &[ConversationTurn]) -> Result<String, GenerationError> {
        Err(GenerationError::Request("not configured".to_string()))
    }

    async fn end_session(&self, _: &str) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn keepalive(&self, _: &str) -> Result<(), GenerationError> {
        Ok(())
    }
}
