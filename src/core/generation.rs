//! Response-generation collaborator.
//!
//! The generation backend is a black box reached over HTTP: given the
//! agent persona, the transcript so far, and (on the first turn) a
//! caller-history snapshot, it produces the next spoken reply. It also
//! summarizes finished transcripts and accepts session-lifecycle
//! notifications. A best-effort keepalive probe keeps the backend warm for
//! the duration of a call.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::storage::ConversationTurn;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation backend returned status {0}: {1}")]
    Backend(u16, String),
    #[error("generation backend returned no text")]
    EmptyResponse,
}

/// Everything the backend needs to produce one reply.
#[derive(Debug, Serialize)]
pub struct GenerationRequest<'a> {
    pub call_id: &'a str,
    pub agent_name: &'a str,
    pub agent_context: &'a str,
    /// Rendered prior-call context; present on the first turn only.
    pub caller_history: Option<&'a str>,
    pub history: &'a [ConversationTurn],
    pub user_text: &'a str,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate the next reply. The caller bounds this with a timeout.
    async fn respond(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;

    /// Summarize a finished transcript in one or two sentences, for
    /// cross-call memory lookups.
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String, GenerationError>;

    /// Tell the backend the session ended. Best effort; failures are the
    /// caller's to log, never to retry.
    async fn end_session(&self, call_id: &str) -> Result<(), GenerationError>;

    /// Single keepalive probe; `spawn_keepalive` drives this in a loop.
    async fn keepalive(&self, call_id: &str) -> Result<(), GenerationError>;
}

/// HTTP client for the generation backend.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn post_for_text(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(status.as_u16(), body));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        let text = parsed
            .get("text")
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(GenerationError::EmptyResponse)?;
        Ok(text)
    }
}

#[async_trait]
impl ResponseGenerator for HttpGenerator {
    async fn respond(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        self.post_for_text("/respond", serde_json::to_value(&request).unwrap_or_default())
            .await
    }

    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String, GenerationError> {
        let transcript: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| json!({ "speaker": t.speaker.to_string(), "text": t.text }))
            .collect();
        self.post_for_text("/summarize", json!({ "turns": transcript }))
            .await
    }

    async fn end_session(&self, call_id: &str) -> Result<(), GenerationError> {
        self.client
            .post(format!("{}/call/end", self.base_url))
            .json(&json!({ "call_id": call_id }))
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(())
    }

    async fn keepalive(&self, call_id: &str) -> Result<(), GenerationError> {
        let response = self
            .client
            .get(format!("{}/keepalive", self.base_url))
            .query(&[("call_id", call_id)])
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GenerationError::Backend(
                response.status().as_u16(),
                String::new(),
            ));
        }
        Ok(())
    }
}

/// Interval between keepalive probes while a call is live.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Spawn the best-effort keepalive loop for a call. Failures are logged at
/// debug and never fatal; the returned token tears the loop down on
/// terminal status.
pub fn spawn_keepalive(
    generator: std::sync::Arc<dyn ResponseGenerator>,
    call_id: String,
) -> CancellationToken {
    let token = CancellationToken::new();
    let loop_token = token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = loop_token.cancelled() => {
                    tracing::debug!(call_id = %call_id, "Keepalive loop cancelled");
                    break;
                }
                result = generator.keepalive(&call_id) => {
                    if let Err(e) = result {
                        tracing::debug!(call_id = %call_id, error = %e, "Keepalive probe failed");
                    }
                    tokio::select! {
                        _ = loop_token.cancelled() => break,
                        _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {}
                    }
                }
            }
        }
    });
    token
}
