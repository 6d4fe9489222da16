//! Audio-serving endpoint.
//!
//! The provider fetches `<Play>` URLs from here. Entries survive reads so
//! provider-side retries succeed; expired or unknown ids are 404.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::app_error::AppError;
use crate::state::AppState;

/// `GET /twilio/audio/{audio_id}`
pub async fn serve_audio(
    State(state): State<Arc<AppState>>,
    Path(audio_id): Path<String>,
) -> Response {
    match state.audio_cache.get(&audio_id).await {
        Some(audio) => {
            debug!(audio_id = %audio_id, bytes = audio.len(), "Serving cached audio");
            (
                [
                    (header::CONTENT_TYPE, "audio/mpeg"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                audio,
            )
                .into_response()
        }
        None => {
            warn!(audio_id = %audio_id, "Audio not found or expired");
            AppError::NotFound(format!("audio {audio_id}")).into_response()
        }
    }
}
