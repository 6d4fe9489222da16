//! Terminal-status webhook.
//!
//! Called by the provider when a call ends (or changes state; only the
//! recognized terminal codes trigger cleanup). Always answers 204
//! promptly; teardown and summarization run as detached tasks.

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::registry::CallPhase;
use crate::state::AppState;

const TERMINAL_STATUSES: [&str; 5] = ["completed", "busy", "failed", "no-answer", "canceled"];

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

/// `POST /twilio/status`
pub async fn handle_terminal_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
    Form(form): Form<StatusForm>,
) -> StatusCode {
    if !TERMINAL_STATUSES.contains(&form.call_status.as_str()) {
        return StatusCode::NO_CONTENT;
    }

    // Resolve the internal call id from the explicit parameter or the
    // provider-id mapping
    let call_id = match query.call_id.or_else(|| state.registry.resolve(&form.call_sid)) {
        Some(id) => id,
        None => {
            info!(
                provider_call_id = %form.call_sid,
                status = %form.call_status,
                "No session for terminal status; already cleaned up or unknown call"
            );
            return StatusCode::NO_CONTENT;
        }
    };

    info!(
        call_id = %call_id,
        status = %form.call_status,
        provider_call_id = %form.call_sid,
        "Call ended"
    );

    if let Err(e) = state.registry.transition(&call_id, CallPhase::Terminated) {
        warn!(call_id = %call_id, error = %e, "Phase transition rejected");
    }

    // Removing the session cancels the keepalive handle and any
    // unconsumed history prefetch
    let session = state.registry.remove(&call_id);

    // Tell the backend the session ended. Fire-and-forget.
    {
        let generator = state.generator.clone();
        let call_id = call_id.clone();
        tokio::spawn(async move {
            if let Err(e) = generator.end_session(&call_id).await {
                error!(call_id = %call_id, error = %e, "Failed to notify backend of call end");
            }
        });
    }

    // Summarize the transcript for cross-call memory, but only on normal
    // completion
    if form.call_status == "completed" {
        let started_at = session.map(|s| s.started_at);
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = summarize_call(&state, &call_id, started_at).await {
                error!(call_id = %call_id, error = %e, "Post-call summarization failed");
            }
        });
    }

    StatusCode::NO_CONTENT
}

async fn summarize_call(
    state: &AppState,
    call_id: &str,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
) -> anyhow::Result<()> {
    let turns = state.store.turns(call_id).await?;
    let summary = if turns.is_empty() {
        "No conversation recorded.".to_string()
    } else {
        state.generator.summarize(&turns).await?
    };

    let duration_seconds = started_at
        .map(|t| (chrono::Utc::now() - t).num_seconds().max(0))
        .unwrap_or(0);

    state
        .store
        .finish_call(call_id, duration_seconds, &summary)
        .await?;
    info!(call_id = %call_id, duration_seconds, "Call summarized");
    Ok(())
}
