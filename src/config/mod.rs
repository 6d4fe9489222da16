//! Configuration module for the switchboard server
//!
//! Configuration is read from environment variables (with an optional
//! `.env` file). Validation runs once at startup so a misconfigured
//! deployment fails fast instead of mid-call.
//!
//! # Modules
//! - `env`: environment variable loading
//! - `validation`: configuration validation logic

use std::time::Duration;

mod env;
mod validation;

/// Server configuration
///
/// Contains everything needed to run the switchboard server:
/// - Server settings (host, port, externally reachable base URL)
/// - Telephony provider credentials (Twilio)
/// - Speech provider API key (ElevenLabs)
/// - Generation backend base URL
/// - Turn budget, TTLs, and the background generation timeout
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, embedded in callback URLs handed to
    /// the telephony provider (no trailing slash).
    pub app_base_url: String,

    // Generation backend
    pub backend_base_url: String,
    pub generation_timeout_seconds: u64,

    // Telephony provider credentials
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    /// Twilio REST API base; overridable so tests can point at a stub.
    pub twilio_api_base: String,

    // Speech providers
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,

    // Call behavior
    /// Maximum caller/agent exchanges per call. A call reaching
    /// `max_turns * 2` persisted turns gets a closing statement.
    pub max_turns: u32,
    pub hold_music_url: String,

    // TTLs
    pub audio_cache_ttl_seconds: u64,
    pub idempotency_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
}

impl ServerConfig {
    /// Socket address string for the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_seconds)
    }

    pub fn audio_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.audio_cache_ttl_seconds)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// URL the provider posts each finished recording to.
    pub fn respond_url(&self, agent_id: &str, call_id: &str) -> String {
        format!(
            "{}/twilio/voice/{}/respond?call_id={}",
            self.app_base_url, agent_id, call_id
        )
    }

    /// URL the provider fetches after a successful pipeline run; plays the
    /// cached reply and records the next utterance.
    pub fn callback_url(&self, agent_id: &str, call_id: &str, audio_id: &str) -> String {
        format!(
            "{}/twilio/voice/{}/callback?audio_id={}&call_id={}",
            self.app_base_url, agent_id, audio_id, call_id
        )
    }

    /// URL the provider fetches cached synthesis audio from.
    pub fn audio_url(&self, audio_id: &str) -> String {
        format!("{}/twilio/audio/{}", self.app_base_url, audio_id)
    }
}
