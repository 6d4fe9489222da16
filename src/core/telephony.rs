//! Call control client.
//!
//! Wraps the telephony provider's REST API as an opaque capability: the
//! orchestrator can redirect an in-progress call to new instructions and
//! fetch a recorded utterance, and never inspects anything beyond
//! success/failure.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallControlError {
    #[error("call control request failed: {0}")]
    Request(String),
    #[error("provider returned status {0}: {1}")]
    Provider(u16, String),
    #[error("telephony provider is not configured")]
    NotConfigured,
}

/// New instructions for a live call: either an inline call-control
/// document or a URL the provider fetches one from.
#[derive(Debug, Clone)]
pub enum RedirectTarget {
    Inline(String),
    Url(String),
}

#[async_trait]
pub trait CallControl: Send + Sync {
    /// Interrupt whatever the call is doing and apply new instructions.
    async fn redirect(
        &self,
        provider_call_id: &str,
        target: RedirectTarget,
    ) -> Result<(), CallControlError>;

    /// Download recorded audio from a recording reference (authenticated).
    async fn fetch_recording(&self, recording_url: &str) -> Result<Bytes, CallControlError>;
}

/// Twilio REST implementation. The API base is injectable so tests can
/// point it at a stub server.
pub struct TwilioCallControl {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

impl TwilioCallControl {
    pub fn new(account_sid: String, auth_token: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            api_base,
        }
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn redirect(
        &self,
        provider_call_id: &str,
        target: RedirectTarget,
    ) -> Result<(), CallControlError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.api_base, self.account_sid, provider_call_id
        );
        let params = match &target {
            RedirectTarget::Inline(twiml) => [("Twiml", twiml.as_str())],
            RedirectTarget::Url(fetch_url) => [("Url", fetch_url.as_str())],
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CallControlError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallControlError::Provider(status.as_u16(), body));
        }
        Ok(())
    }

    async fn fetch_recording(&self, recording_url: &str) -> Result<Bytes, CallControlError> {
        // Twilio serves the WAV rendition at the recording URL + ".wav"
        let response = self
            .client
            .get(format!("{recording_url}.wav"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| CallControlError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallControlError::Provider(status.as_u16(), body));
        }

        response
            .bytes()
            .await
            .map_err(|e| CallControlError::Request(e.to_string()))
    }
}
