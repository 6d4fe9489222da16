//! Initial-call webhook.
//!
//! The telephony provider posts here when a call reaches an agent's
//! number. The response must go back within the provider's webhook
//! deadline, so everything slow (history prefetch, backend keepalive)
//! is spawned, never awaited.

use axum::extract::{Form, Path, State};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::generation::spawn_keepalive;
use crate::core::history;
use crate::core::registry::{CallPhase, CallSession};
use crate::core::storage::CallRecord;
use crate::core::twiml::{self, Twiml};
use crate::state::AppState;

/// Form fields the provider posts on an incoming call.
#[derive(Debug, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

/// `POST /twilio/voice/{agent_id}`
pub async fn handle_incoming_call(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Form(form): Form<IncomingCallForm>,
) -> Twiml {
    // Validate the target agent exists
    let agent = match state.store.agent(&agent_id).await {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            info!(agent_id = %agent_id, "Incoming call for unknown agent");
            return twiml::agent_unavailable();
        }
        Err(e) => {
            error!(agent_id = %agent_id, error = %e, "Agent lookup failed");
            return twiml::agent_unavailable();
        }
    };

    let caller = form.from.clone().unwrap_or_default();
    let call_id = Uuid::new_v4().to_string();
    info!(
        call_id = %call_id,
        agent_id = %agent_id,
        provider_call_id = %form.call_sid,
        "Incoming call"
    );

    // Log the call before the first turn; finalized on terminal status
    let record = CallRecord {
        id: call_id.clone(),
        agent_id: agent_id.clone(),
        caller: caller.clone(),
        started_at: chrono::Utc::now(),
        duration_seconds: 0,
        summary: None,
    };
    if let Err(e) = state.store.insert_call(record).await {
        error!(call_id = %call_id, error = %e, "Failed to persist call record");
        return twiml::error_hangup();
    }

    // Cross-invocation memory for the rest of the call
    let session = CallSession::new(&call_id, &form.call_sid, &agent_id, &caller);
    state.registry.register(session);

    // Prefetch prior-call context while the greeting plays
    let history_handle = history::prefetch(state.store.clone(), agent_id.clone(), caller);
    state.registry.set_history(&call_id, history_handle);

    // Best-effort warm connection to the generation backend
    let keepalive = spawn_keepalive(state.generator.clone(), call_id.clone());
    state.registry.set_keepalive(&call_id, keepalive);

    if let Err(e) = state
        .registry
        .transition(&call_id, CallPhase::GreetedAwaitingRecording)
    {
        error!(call_id = %call_id, error = %e, "Phase transition rejected");
    }

    let respond_url = state.config.respond_url(&agent_id, &call_id);
    twiml::greeting(&agent.name, &respond_url)
}
