//! Per-turn processing pipeline.
//!
//! Runs detached from the turn webhook, which has already answered with a
//! hold document: provider webhook deadlines are seconds, end-to-end
//! generation latency is not. Stages run strictly in order; the first
//! failure aborts the rest and surfaces one [`PipelineError`] to the
//! supervision wrapper, which issues the single recovery redirect.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::generation::{GenerationError, GenerationRequest};
use crate::core::registry::CallPhase;
use crate::core::storage::{ConversationTurn, Speaker, StoreError};
use crate::core::stt::SttError;
use crate::core::telephony::{CallControlError, RedirectTarget};
use crate::core::tts::TtsError;
use crate::core::twiml;
use crate::state::AppState;

/// After this many consecutive pipeline failures on one call, the
/// recovery redirect becomes a spoken goodbye + hangup instead of another
/// re-prompt.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("recording download failed: {0}")]
    Download(String),
    #[error("transcription failed: {0}")]
    Transcription(#[from] SttError),
    #[error("generation backend error: {0}")]
    Backend(#[from] GenerationError),
    #[error("generation backend timed out after {0:?}")]
    BackendTimeout(Duration),
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] TtsError),
    #[error("call control failed: {0}")]
    CallControl(#[from] CallControlError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// How a successful pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply synthesized and the call redirected to play it.
    Replied,
    /// Empty transcription; the caller was asked to repeat.
    Reprompted,
    /// Turn budget reached; closing statement issued.
    Closed,
    /// The agent row disappeared mid-call; the call was ended politely.
    AgentGone,
}

/// Identity of the turn being processed.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub provider_call_id: String,
    pub agent_id: String,
    pub call_id: String,
    pub recording_url: String,
}

/// Launch the pipeline detached from the current request and apply the
/// supervision policy: success resets the failure counter; failure drives
/// exactly one recovery redirect (or a goodbye once the call has failed
/// [`MAX_CONSECUTIVE_FAILURES`] times in a row). A failing recovery
/// redirect is logged and never retried.
pub fn spawn_turn_pipeline(state: Arc<AppState>, ctx: TurnContext) {
    tokio::spawn(async move {
        match process_turn(state.clone(), &ctx).await {
            Ok(outcome) => {
                state.registry.reset_failures(&ctx.call_id);
                tracing::info!(
                    call_id = %ctx.call_id,
                    outcome = ?outcome,
                    "Turn pipeline finished"
                );
            }
            Err(e) => {
                tracing::error!(call_id = %ctx.call_id, error = %e, "Turn pipeline failed");
                recover(state, &ctx).await;
            }
        }
    });
}

async fn recover(state: Arc<AppState>, ctx: &TurnContext) {
    let failures = state.registry.record_failure(&ctx.call_id);

    let (doc, next_phase) = if failures >= MAX_CONSECUTIVE_FAILURES {
        tracing::warn!(
            call_id = %ctx.call_id,
            failures,
            "Consecutive failures exhausted recovery; ending call"
        );
        (twiml::goodbye_hangup(), CallPhase::Closing)
    } else {
        let respond_url = state.config.respond_url(&ctx.agent_id, &ctx.call_id);
        (
            twiml::recovery(&respond_url),
            CallPhase::RecoveryAwaitingRecording,
        )
    };

    match state
        .call_control
        .redirect(&ctx.provider_call_id, RedirectTarget::Inline(doc.0))
        .await
    {
        Ok(()) => set_phase(&state, &ctx.call_id, next_phase),
        Err(e) => {
            // The call may simply have ended already; let it end naturally.
            tracing::error!(call_id = %ctx.call_id, error = %e, "Recovery redirect failed");
        }
    }
}

fn set_phase(state: &AppState, call_id: &str, phase: CallPhase) {
    if let Err(e) = state.registry.transition(call_id, phase) {
        tracing::warn!(call_id = %call_id, error = %e, "Phase transition rejected");
    }
}

/// The strictly ordered turn workflow: download → transcribe → persist →
/// budget check → generate → persist → synthesize → cache → redirect.
pub async fn process_turn(
    state: Arc<AppState>,
    ctx: &TurnContext,
) -> Result<TurnOutcome, PipelineError> {
    let started = Instant::now();

    // 1. Fetch recorded audio (authenticated retrieval)
    let audio = state
        .call_control
        .fetch_recording(&ctx.recording_url)
        .await
        .map_err(|e| PipelineError::Download(e.to_string()))?;
    tracing::debug!(
        call_id = %ctx.call_id,
        bytes = audio.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Recording downloaded"
    );

    // 2. Transcribe. Empty speech is a normal branch: re-prompt and
    //    re-enter the recording state.
    let user_text = state.stt.transcribe(audio).await?;
    let user_text = user_text.trim().to_string();
    tracing::debug!(
        call_id = %ctx.call_id,
        transcript = %user_text,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transcription complete"
    );
    if user_text.is_empty() {
        let respond_url = state.config.respond_url(&ctx.agent_id, &ctx.call_id);
        state
            .call_control
            .redirect(
                &ctx.provider_call_id,
                RedirectTarget::Inline(twiml::reprompt(&respond_url).0),
            )
            .await?;
        set_phase(&state, &ctx.call_id, CallPhase::RespondedAwaitingRecording);
        return Ok(TurnOutcome::Reprompted);
    }

    // 3. Persist the caller's turn with the next sequence number
    let seq = state.store.turn_count(&ctx.call_id).await? as u32 + 1;
    state
        .store
        .insert_turn(ConversationTurn {
            id: Uuid::new_v4().to_string(),
            call_id: ctx.call_id.clone(),
            seq,
            speaker: Speaker::Caller,
            text: user_text.clone(),
            audio_url: Some(ctx.recording_url.clone()),
        })
        .await?;

    // 4. Turn budget: close the call regardless of transcript content
    if seq >= state.config.max_turns * 2 {
        state
            .call_control
            .redirect(
                &ctx.provider_call_id,
                RedirectTarget::Inline(twiml::closing().0),
            )
            .await?;
        set_phase(&state, &ctx.call_id, CallPhase::Closing);
        return Ok(TurnOutcome::Closed);
    }

    // 5. Agent persona + (first turn only) the prefetched caller history
    let Some(agent) = state.store.agent(&ctx.agent_id).await? else {
        tracing::warn!(call_id = %ctx.call_id, agent_id = %ctx.agent_id, "Agent vanished mid-call");
        state
            .call_control
            .redirect(
                &ctx.provider_call_id,
                RedirectTarget::Inline(twiml::agent_unavailable().0),
            )
            .await?;
        set_phase(&state, &ctx.call_id, CallPhase::Closing);
        return Ok(TurnOutcome::AgentGone);
    };

    let caller_history = if seq == 1 {
        match state.registry.take_history(&ctx.call_id) {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        }
    } else {
        // Later turns rely on the backend's own session memory
        None
    };

    let transcript = state.store.turns(&ctx.call_id).await?;

    // 6. Generate the reply, bounded by the configured timeout
    let timeout = state.config.generation_timeout();
    let request = GenerationRequest {
        call_id: &ctx.call_id,
        agent_name: &agent.name,
        agent_context: &agent.context,
        caller_history: caller_history.as_deref(),
        history: &transcript,
        user_text: &user_text,
    };
    let reply = match tokio::time::timeout(timeout, state.generator.respond(request)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(PipelineError::Backend(e)),
        Err(_) => return Err(PipelineError::BackendTimeout(timeout)),
    };
    tracing::debug!(
        call_id = %ctx.call_id,
        reply = %reply,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reply generated"
    );

    // 7. Persist the agent's reply as the next turn
    state
        .store
        .insert_turn(ConversationTurn {
            id: Uuid::new_v4().to_string(),
            call_id: ctx.call_id.clone(),
            seq: seq + 1,
            speaker: Speaker::Agent,
            text: reply.clone(),
            audio_url: None,
        })
        .await?;

    // 8. Synthesize and cache under a fresh id
    let reply_audio = state.tts.synthesize(&reply).await?;
    let audio_id = Uuid::new_v4().to_string();
    state.audio_cache.put(&audio_id, reply_audio).await;

    // 9. Redirect the live call: play the cached audio, record next turn
    let callback_url = state
        .config
        .callback_url(&ctx.agent_id, &ctx.call_id, &audio_id);
    state
        .call_control
        .redirect(&ctx.provider_call_id, RedirectTarget::Url(callback_url))
        .await?;
    set_phase(&state, &ctx.call_id, CallPhase::RespondedAwaitingRecording);

    tracing::info!(
        call_id = %ctx.call_id,
        seq,
        total_ms = started.elapsed().as_millis() as u64,
        "Turn processed"
    );
    Ok(TurnOutcome::Replied)
}
