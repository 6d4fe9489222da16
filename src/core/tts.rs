//! Text-to-speech collaborator.
//!
//! Black-box text→bytes behind a trait. The shipped implementation calls
//! the ElevenLabs synthesis endpoint and returns MP3 bytes, which the
//! audio cache serves back to the telephony provider.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS request failed: {0}")]
    Request(String),
    #[error("TTS provider returned status {0}: {1}")]
    Provider(u16, String),
    #[error("TTS provider is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize speech for a reply. Returns encoded audio bytes
    /// (audio/mpeg for the shipped provider).
    async fn synthesize(&self, text: &str) -> Result<Bytes, TtsError>;
}

pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// ElevenLabs TTS client.
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    base_url: String,
}

impl ElevenLabsTts {
    pub fn new(api_key: String, voice_id: String) -> Self {
        Self::with_base_url(api_key, voice_id, ELEVENLABS_TTS_URL.to_string())
    }

    pub fn with_base_url(api_key: String, voice_id: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            base_url,
        }
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<Bytes, TtsError> {
        let url = format!(
            "{}/{}?output_format=mp3_44100_128",
            self.base_url, self.voice_id
        );
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": "eleven_turbo_v2_5",
            }))
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Provider(status.as_u16(), body));
        }

        response
            .bytes()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))
    }
}
