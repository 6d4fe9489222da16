//! Per-turn recording webhook.
//!
//! The provider posts each finished recording here. The handler answers
//! immediately with a hold document and runs the actual turn pipeline
//! detached; the idempotency guard makes provider retries of the same
//! recording a no-op.

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::pipeline::{TurnContext, spawn_turn_pipeline};
use crate::core::registry::CallPhase;
use crate::core::twiml;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RespondQuery {
    pub call_id: Option<String>,
}

/// Form fields the provider posts after a `<Record>`.
#[derive(Debug, Deserialize)]
pub struct TurnRecordingForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    /// Absent on recording-status style notifications; those are no-ops.
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
}

/// `POST /twilio/voice/{agent_id}/respond?call_id=`
pub async fn handle_turn_recording(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<RespondQuery>,
    Form(form): Form<TurnRecordingForm>,
) -> Response {
    let Some(call_id) = query.call_id else {
        warn!(agent_id = %agent_id, "Turn webhook without call_id");
        return twiml::error_hangup().into_response();
    };

    // Health-check style posts carry no recording reference
    let Some(recording_url) = form.recording_url else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let hold = twiml::hold(&state.config.hold_music_url);

    // At-most-once per recording reference despite provider retries.
    // Duplicates get the identical hold response and nothing else happens.
    if !state.idempotency.try_acquire(&recording_url) {
        info!(call_id = %call_id, "Duplicate turn webhook ignored");
        return hold.into_response();
    }

    info!(call_id = %call_id, "Recording received, scheduling turn pipeline");

    if let Err(e) = state.registry.transition(&call_id, CallPhase::Processing) {
        // Session may have been reaped or the call raced its own teardown;
        // the pipeline still runs and its redirect fails harmlessly then.
        warn!(call_id = %call_id, error = %e, "Phase transition rejected");
    }

    spawn_turn_pipeline(
        state.clone(),
        TurnContext {
            provider_call_id: form.call_sid,
            agent_id,
            call_id,
            recording_url,
        },
    );

    // Keep the caller on the line with audio while the pipeline runs
    hold.into_response()
}
