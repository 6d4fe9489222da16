//! Call state registry.
//!
//! Process-wide cross-invocation memory for live calls: webhook deliveries
//! share no state of their own, so every handler resolves its
//! [`CallSession`] here. Sessions are keyed both by the provider's call id
//! (status callbacks only carry that) and by our internal call id (stable
//! across turns, embedded in callback URLs).
//!
//! A deployment running multiple processes needs an externally shared
//! store with equivalent semantics; this registry is deliberately
//! process-local.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call lifecycle phase.
///
/// `Processing` has no externally observable webhook; it exists only while
/// the detached turn pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Initiated,
    GreetedAwaitingRecording,
    Processing,
    RespondedAwaitingRecording,
    RecoveryAwaitingRecording,
    Closing,
    Terminated,
}

impl CallPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn permits(self, next: CallPhase) -> bool {
        use CallPhase::*;
        match (self, next) {
            (Initiated, GreetedAwaitingRecording) => true,
            (GreetedAwaitingRecording, Processing) => true,
            (RespondedAwaitingRecording, Processing) => true,
            (RecoveryAwaitingRecording, Processing) => true,
            (Processing, RespondedAwaitingRecording) => true,
            (Processing, RecoveryAwaitingRecording) => true,
            (Processing, Closing) => true,
            // Terminal status webhook can arrive in any phase
            (_, Terminated) => self != Terminated,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown call {0}")]
    UnknownCall(String),
    #[error("invalid phase transition {from:?} -> {to:?} for call {call_id}")]
    InvalidTransition {
        call_id: String,
        from: CallPhase,
        to: CallPhase,
    },
}

/// Orchestrator session data for one live call.
///
/// Owned exclusively by the registry; handlers and the pipeline mutate it
/// only through registry methods so every access holds the lock.
pub struct CallSession {
    pub call_id: String,
    pub provider_call_id: String,
    pub agent_id: String,
    pub caller: String,
    pub phase: CallPhase,
    pub started_at: DateTime<Utc>,
    /// Cancellation handle for the keepalive connection to the generation
    /// backend. Invoked on terminal status.
    pub keepalive: Option<CancellationToken>,
    /// Prefetched caller-history future, consumed exactly once by the
    /// first turn that needs it.
    pub history: Option<JoinHandle<Option<String>>>,
    /// Consecutive pipeline failures; reset on any successful run.
    pub consecutive_failures: u32,
    registered_at: Instant,
}

impl CallSession {
    pub fn new(
        call_id: impl Into<String>,
        provider_call_id: impl Into<String>,
        agent_id: impl Into<String>,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            provider_call_id: provider_call_id.into(),
            agent_id: agent_id.into(),
            caller: caller.into(),
            phase: CallPhase::Initiated,
            started_at: Utc::now(),
            keepalive: None,
            history: None,
            consecutive_failures: 0,
            registered_at: Instant::now(),
        }
    }

    fn tear_down(&mut self) {
        if let Some(token) = self.keepalive.take() {
            token.cancel();
        }
        if let Some(handle) = self.history.take() {
            handle.abort();
        }
    }
}

/// Process-wide map from call identifiers to session data.
///
/// Coarse global locking: per-call contention is low (one pipeline at a
/// time per call) and critical sections never await.
#[derive(Default)]
pub struct CallRegistry {
    sessions: RwLock<HashMap<String, CallSession>>,
    // provider call id -> internal call id
    provider_index: RwLock<HashMap<String, String>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: CallSession) {
        self.provider_index
            .write()
            .insert(session.provider_call_id.clone(), session.call_id.clone());
        self.sessions
            .write()
            .insert(session.call_id.clone(), session);
    }

    /// Resolve the internal call id for a provider call id.
    pub fn resolve(&self, provider_call_id: &str) -> Option<String> {
        self.provider_index.read().get(provider_call_id).cloned()
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.sessions.read().contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn phase(&self, call_id: &str) -> Option<CallPhase> {
        self.sessions.read().get(call_id).map(|s| s.phase)
    }

    pub fn started_at(&self, call_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.read().get(call_id).map(|s| s.started_at)
    }

    /// Move a call to a new phase, rejecting transitions the state machine
    /// does not permit.
    pub fn transition(&self, call_id: &str, to: CallPhase) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(call_id)
            .ok_or_else(|| RegistryError::UnknownCall(call_id.to_string()))?;
        if !session.phase.permits(to) {
            return Err(RegistryError::InvalidTransition {
                call_id: call_id.to_string(),
                from: session.phase,
                to,
            });
        }
        session.phase = to;
        Ok(())
    }

    pub fn set_keepalive(&self, call_id: &str, token: CancellationToken) {
        if let Some(session) = self.sessions.write().get_mut(call_id) {
            session.keepalive = Some(token);
        }
    }

    pub fn set_history(&self, call_id: &str, handle: JoinHandle<Option<String>>) {
        if let Some(session) = self.sessions.write().get_mut(call_id) {
            session.history = Some(handle);
        }
    }

    /// Take the prefetched-history handle, leaving `None` behind. Later
    /// turns rely on the generation backend's own session memory.
    pub fn take_history(&self, call_id: &str) -> Option<JoinHandle<Option<String>>> {
        self.sessions
            .write()
            .get_mut(call_id)
            .and_then(|s| s.history.take())
    }

    /// Record a pipeline failure; returns the consecutive-failure count.
    pub fn record_failure(&self, call_id: &str) -> u32 {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(call_id) {
            Some(session) => {
                session.consecutive_failures += 1;
                session.consecutive_failures
            }
            None => 0,
        }
    }

    pub fn reset_failures(&self, call_id: &str) {
        if let Some(session) = self.sessions.write().get_mut(call_id) {
            session.consecutive_failures = 0;
        }
    }

    /// Remove a session by internal call id, cancelling its background
    /// handles. Returns the session for the caller's teardown work.
    pub fn remove(&self, call_id: &str) -> Option<CallSession> {
        let mut session = self.sessions.write().remove(call_id)?;
        self.provider_index.write().remove(&session.provider_call_id);
        session.tear_down();
        Some(session)
    }

    /// Remove sessions older than `ttl`, cancelling their handles. Safety
    /// net for calls whose terminal status webhook never arrived; keeps
    /// the registry bounded.
    pub fn reap_expired(&self, ttl: std::time::Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| now.duration_since(s.registered_at) >= ttl)
            .map(|s| s.call_id.clone())
            .collect();
        for call_id in &expired {
            tracing::warn!(call_id = %call_id, "Reaping stale call session");
            self.remove(call_id);
        }
        expired.len()
    }
}
