//! Post-pipeline playback callback.
//!
//! The pipeline's redirect points the live call at this URL. The returned
//! document plays the cached reply and records the caller's next
//! utterance at the respond endpoint, carrying the same internal call id.

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::core::twiml::{self, Twiml};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub audio_id: Option<String>,
    pub call_id: Option<String>,
}

/// `POST /twilio/voice/{agent_id}/callback?audio_id=&call_id=`
pub async fn handle_playback_callback(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Twiml {
    let (Some(audio_id), Some(call_id)) = (query.audio_id, query.call_id) else {
        warn!(agent_id = %agent_id, "Playback callback missing audio_id or call_id");
        return twiml::error_hangup();
    };

    let audio_url = state.config.audio_url(&audio_id);
    let respond_url = state.config.respond_url(&agent_id, &call_id);
    twiml::play_and_record(&audio_url, &respond_url)
}
