//! Call session storage for callrelay.
//!
//! Holds every call the process knows about in a process-local map keyed by
//! call SID. Sessions live until they are removed explicitly (terminal status
//! callback with `retain_completed = false`), pruned by age, or the process
//! restarts. Nothing is persisted.
//!
//! The map sits behind a `std::sync::RwLock`. Every acquisition is a short
//! `HashMap` operation that never spans an `.await`, so a synchronous lock is
//! safe to use from async handlers. Appends to one call are serialized by the
//! write lock, so concurrent webhook retries cannot drop turns.

use callrelay_types::{CallDirection, CallSession, CallStatus, SessionSummary, TurnRecord};
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
}

/// Shared handle to the call session map. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, CallSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CallSession>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            // A panicking writer leaves the map structurally intact; keep
            // serving it rather than failing every call.
            tracing::error!("session store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CallSession>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            tracing::error!("session store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Inserts a session, replacing any previous session with the same SID.
    pub fn create(&self, session: CallSession) {
        let call_sid = session.call_sid.clone();
        if self.write().insert(call_sid.clone(), session).is_some() {
            tracing::warn!(call_sid = %call_sid, "replaced existing call session");
        } else {
            tracing::debug!(call_sid = %call_sid, "created call session");
        }
    }

    /// Tracks a call placed through the REST API and returns the stored
    /// session.
    ///
    /// Twilio may hit the answer webhook before the create request returns,
    /// in which case the webhook's session wins: its status and turns are
    /// kept and it only takes `initial_message` when it has none.
    pub fn create_or_merge(&self, session: CallSession) -> CallSession {
        let mut sessions = self.write();
        match sessions.get_mut(&session.call_sid) {
            Some(existing) => {
                tracing::debug!(call_sid = %session.call_sid, "merged placed call into existing session");
                if existing.initial_message.is_none() {
                    existing.initial_message = session.initial_message;
                }
                existing.clone()
            }
            None => {
                tracing::debug!(call_sid = %session.call_sid, "created call session");
                sessions.insert(session.call_sid.clone(), session.clone());
                session
            }
        }
    }

    /// Returns the session for `call_sid`, creating an in-progress one first
    /// if the call is unknown.
    pub fn get_or_create(
        &self,
        call_sid: &str,
        from: &str,
        to: &str,
        direction: CallDirection,
    ) -> CallSession {
        let mut sessions = self.write();
        sessions
            .entry(call_sid.to_string())
            .or_insert_with(|| {
                tracing::info!(call_sid, from, to, ?direction, "opened call session");
                CallSession::new(call_sid, from, to, direction, CallStatus::InProgress)
            })
            .clone()
    }

    /// Returns a snapshot of the session.
    pub fn get(&self, call_sid: &str) -> Option<CallSession> {
        self.read().get(call_sid).cloned()
    }

    pub fn contains(&self, call_sid: &str) -> bool {
        self.read().contains_key(call_sid)
    }

    /// Appends a turn to the call's history and returns the new length.
    pub fn append_turn(&self, call_sid: &str, turn: TurnRecord) -> Result<usize, SessionError> {
        let mut sessions = self.write();
        let session = sessions
            .get_mut(call_sid)
            .ok_or_else(|| SessionError::NotFound(call_sid.to_string()))?;
        tracing::debug!(call_sid, role = turn.role.as_str(), "recorded turn");
        session.conversation_history.push(turn);
        Ok(session.conversation_history.len())
    }

    /// Returns a snapshot of the call's turns, empty for unknown calls.
    pub fn history(&self, call_sid: &str) -> Vec<TurnRecord> {
        self.read()
            .get(call_sid)
            .map(|s| s.conversation_history.clone())
            .unwrap_or_default()
    }

    /// Records a status change. Terminal statuses stamp `ended_at` once.
    pub fn set_status(&self, call_sid: &str, status: CallStatus) -> Result<(), SessionError> {
        let mut sessions = self.write();
        let session = sessions
            .get_mut(call_sid)
            .ok_or_else(|| SessionError::NotFound(call_sid.to_string()))?;
        session.status = status;
        if status.is_terminal() && session.ended_at.is_none() {
            session.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn remove(&self, call_sid: &str) -> Option<CallSession> {
        self.write().remove(call_sid)
    }

    /// Listing of all sessions, ordered by call SID.
    pub fn summaries(&self) -> BTreeMap<String, SessionSummary> {
        self.read()
            .iter()
            .map(|(sid, session)| (sid.clone(), session.summary()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of sessions whose call has not reached a terminal status.
    pub fn active_count(&self) -> usize {
        self.read().values().filter(|s| !s.is_ended()).count()
    }

    /// Removes sessions that started more than `ttl` ago and returns their SIDs.
    ///
    /// A `ttl` reaching past the earliest representable time prunes nothing.
    pub fn prune_older_than(&self, ttl: Duration) -> Vec<String> {
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return Vec::new();
        };
        let mut sessions = self.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.started_at < cutoff)
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in &expired {
            sessions.remove(sid);
        }
        expired
    }
}
