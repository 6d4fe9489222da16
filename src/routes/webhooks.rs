use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{audio, callback, respond, status, voice};
use crate::state::AppState;

/// Create the webhook router for the telephony provider's callbacks.
///
/// These routes are called by the provider and use its own request
/// signing rather than this server's auth; they must never sit behind an
/// auth middleware.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/twilio/voice/{agent_id}", post(voice::handle_incoming_call))
        .route(
            "/twilio/voice/{agent_id}/respond",
            post(respond::handle_turn_recording),
        )
        .route(
            "/twilio/voice/{agent_id}/callback",
            post(callback::handle_playback_callback),
        )
        .route("/twilio/audio/{audio_id}", get(audio::serve_audio))
        .route("/twilio/status", post(status::handle_terminal_status))
        .layer(TraceLayer::new_for_http())
}
