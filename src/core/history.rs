//! Caller history prefetcher.
//!
//! While the greeting plays, a background task loads the caller's prior
//! completed calls with this agent and renders them into a short text
//! block. The first turn's generation request consumes the result exactly
//! once; no latency is ever added to the greeting itself.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::core::storage::{CallRecord, CallStore, ConversationTurn};

/// How many prior calls to surface.
const MAX_PRIOR_CALLS: usize = 3;
/// How many opening turns of each prior call to include.
const TURNS_PER_CALL: usize = 4;

/// Spawn the prefetch task. Resolves to `None` when the caller has no
/// prior completed calls with this agent.
pub fn prefetch(
    store: Arc<dyn CallStore>,
    agent_id: String,
    caller: String,
) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        match load_history(store, &agent_id, &caller).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(agent_id = %agent_id, error = %e, "Caller history prefetch failed");
                None
            }
        }
    })
}

async fn load_history(
    store: Arc<dyn CallStore>,
    agent_id: &str,
    caller: &str,
) -> Result<Option<String>, crate::core::storage::StoreError> {
    let calls = store.recent_calls(agent_id, caller, MAX_PRIOR_CALLS).await?;
    if calls.is_empty() {
        return Ok(None);
    }

    let mut blocks = Vec::with_capacity(calls.len());
    for call in &calls {
        let turns = store.turns(&call.id).await?;
        blocks.push(render_call(call, &turns));
    }

    Ok(Some(format!(
        "Previous calls from this number:\n\n{}",
        blocks.join("\n\n")
    )))
}

/// Render one prior call: date, duration, summary when available, and the
/// first few turns.
fn render_call(call: &CallRecord, turns: &[ConversationTurn]) -> String {
    let mut block = format!(
        "Call on {} ({}s)",
        call.started_at.format("%Y-%m-%d %H:%M UTC"),
        call.duration_seconds
    );
    if let Some(summary) = &call.summary {
        block.push_str(&format!("\nSummary: {summary}"));
    }
    for turn in turns.iter().take(TURNS_PER_CALL) {
        block.push_str(&format!("\n{}: {}", turn.speaker, turn.text));
    }
    block
}
