//! Storage collaborator interface.
//!
//! Durable storage of agents, calls, and turns lives in an external
//! warehouse; the orchestrator only needs the narrow query/insert surface
//! below. [`MemoryStore`] implements it in-process and backs the default
//! build and the test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The slice of the agents table the orchestrator reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// Persona/knowledge block fed to the generation backend.
    pub context: String,
}

/// One row of call history. Inserted at call start with zero duration and
/// no summary; finalized by post-call summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub agent_id: String,
    pub caller: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Caller,
    Agent,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::Caller => write!(f, "Caller"),
            Speaker::Agent => write!(f, "Agent"),
        }
    }
}

/// One utterance within a call. Immutable once written; sequence numbers
/// are 1-based, strictly increasing, alternating speakers starting with
/// the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub call_id: String,
    pub seq: u32,
    pub speaker: Speaker,
    pub text: String,
    /// Reference to the provider-side recording, when one exists.
    pub audio_url: Option<String>,
}

/// Query/insert interface over the external call warehouse.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn agent(&self, agent_id: &str) -> Result<Option<AgentProfile>, StoreError>;

    async fn insert_call(&self, call: CallRecord) -> Result<(), StoreError>;

    /// Attach final duration and summary to a completed call.
    async fn finish_call(
        &self,
        call_id: &str,
        duration_seconds: i64,
        summary: &str,
    ) -> Result<(), StoreError>;

    /// Append one turn. Turns are never mutated after creation.
    async fn insert_turn(&self, turn: ConversationTurn) -> Result<(), StoreError>;

    /// All turns for a call, ordered by sequence number.
    async fn turns(&self, call_id: &str) -> Result<Vec<ConversationTurn>, StoreError>;

    async fn turn_count(&self, call_id: &str) -> Result<usize, StoreError>;

    /// Prior completed calls for the same caller/agent pair, most recent
    /// first, at most `limit` rows. A call counts as completed once it
    /// carries a summary.
    async fn recent_calls(
        &self,
        agent_id: &str,
        caller: &str,
        limit: usize,
    ) -> Result<Vec<CallRecord>, StoreError>;
}

/// In-memory `CallStore`.
#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<HashMap<String, AgentProfile>>,
    calls: RwLock<HashMap<String, CallRecord>>,
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an agent row (test and local-dev convenience).
    pub fn add_agent(&self, agent: AgentProfile) {
        self.agents.write().insert(agent.id.clone(), agent);
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn agent(&self, agent_id: &str) -> Result<Option<AgentProfile>, StoreError> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    async fn insert_call(&self, call: CallRecord) -> Result<(), StoreError> {
        self.calls.write().insert(call.id.clone(), call);
        Ok(())
    }

    async fn finish_call(
        &self,
        call_id: &str,
        duration_seconds: i64,
        summary: &str,
    ) -> Result<(), StoreError> {
        let mut calls = self.calls.write();
        let call = calls
            .get_mut(call_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown call {call_id}")))?;
        call.duration_seconds = duration_seconds;
        call.summary = Some(summary.to_string());
        Ok(())
    }

    async fn insert_turn(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        self.turns
            .write()
            .entry(turn.call_id.clone())
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn turns(&self, call_id: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        let mut turns = self
            .turns
            .read()
            .get(call_id)
            .cloned()
            .unwrap_or_default();
        turns.sort_by_key(|t| t.seq);
        Ok(turns)
    }

    async fn turn_count(&self, call_id: &str) -> Result<usize, StoreError> {
        Ok(self.turns.read().get(call_id).map_or(0, Vec::len))
    }

    async fn recent_calls(
        &self,
        agent_id: &str,
        caller: &str,
        limit: usize,
    ) -> Result<Vec<CallRecord>, StoreError> {
        let mut matches: Vec<CallRecord> = self
            .calls
            .read()
            .values()
            .filter(|c| c.agent_id == agent_id && c.caller == caller && c.summary.is_some())
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matches.truncate(limit);
        Ok(matches)
    }
}
