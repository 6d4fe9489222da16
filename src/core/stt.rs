//! Speech-to-text collaborator.
//!
//! A black-box bytes→text function behind a trait so tests and alternate
//! providers can swap in. The shipped implementation calls the ElevenLabs
//! batch transcription endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("STT request failed: {0}")]
    Request(String),
    #[error("STT provider returned status {0}: {1}")]
    Provider(u16, String),
    #[error("STT provider is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe recorded audio. An empty or whitespace-only result is a
    /// valid outcome (the caller said nothing), not an error.
    async fn transcribe(&self, audio: Bytes) -> Result<String, SttError>;
}

pub const ELEVENLABS_STT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";

/// ElevenLabs batch STT client.
pub struct ElevenLabsStt {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl ElevenLabsStt {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, ELEVENLABS_STT_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl SpeechToText for ElevenLabsStt {
    async fn transcribe(&self, audio: Bytes) -> Result<String, SttError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model_id", "scribe_v1");

        let response = self
            .client
            .post(&self.base_url)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Provider(status.as_u16(), body));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SttError::Request(e.to_string()))?;
        Ok(parsed.text)
    }
}
