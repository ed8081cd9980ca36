//! Volatile in-process session store.
//!
//! # Responsibility
//! - Map unguessable session identifiers to per-client session state.
//! - Serve concurrent readers and writers from many request handlers.
//!
//! # Invariants
//! - Session ids carry 256 bits of CSPRNG output.
//! - Nothing is persisted; a restart drops every session and every CSRF
//!   nonce bound to one.
//! - With an idle timeout configured, an expired session is
//!   indistinguishable from a missing one.
//! - The map never holds more than `max_sessions` entries; expired entries
//!   are swept from `create`, so memory stays bounded without a timer.

use super::random_token;
use crate::db::now_epoch_ms;
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const SESSION_ID_BYTES: usize = 32;

/// Opaque session identifier (base64url text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier received from a client cookie.
    pub fn from_client(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate() -> Self {
        Self(random_token(SESSION_ID_BYTES))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable per-session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Opaque application payload.
    pub data: BTreeMap<String, String>,
    /// Nonce of the CSRF token currently issued for this session.
    pub csrf_nonce: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last `create`/`update`.
    pub last_seen_at: i64,
}

/// Default cap on live sessions per store.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Upper bound between expiry sweeps triggered by `create`.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrency-safe map from session id to state.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
    idle_timeout: Option<Duration>,
    max_sessions: usize,
    last_sweep_ms: AtomicI64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(None)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions untouched for longer than `idle_timeout` expire.
    pub fn with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::default(),
            idle_timeout,
            max_sessions: DEFAULT_MAX_SESSIONS,
            last_sweep_ms: AtomicI64::new(now_epoch_ms()),
        }
    }

    /// Caps the number of live sessions; the least recently seen one is
    /// evicted to make room. Values below 1 are treated as 1.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Creates and stores a fresh session.
    ///
    /// Expired sessions are swept first when a sweep is due or the store is
    /// full.
    pub fn create(&self) -> (SessionId, SessionState) {
        let now = now_epoch_ms();
        let state = SessionState {
            created_at: now,
            last_seen_at: now,
            ..SessionState::default()
        };

        let mut sessions = self.sessions.write();
        let full = sessions.len() >= self.max_sessions;
        if full || self.sweep_due(now) {
            self.sweep(&mut sessions, now);
        }
        if sessions.len() >= self.max_sessions {
            evict_least_recent(&mut sessions);
        }

        let id = loop {
            let candidate = SessionId::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(id.clone(), state.clone());
        debug!(
            "event=session_create module=security status=ok active={}",
            sessions.len()
        );
        (id, state)
    }

    /// Returns a snapshot of the session, or `None` when absent or expired.
    pub fn get(&self, id: &SessionId) -> Option<SessionState> {
        let sessions = self.sessions.read();
        sessions
            .get(id)
            .filter(|state| !self.is_expired(state, now_epoch_ms()))
            .cloned()
    }

    /// Runs `change` on the live session while holding the write lock and
    /// refreshes `last_seen_at`.
    ///
    /// Returns `None` when the session is absent or expired; nothing is
    /// created in that case.
    pub fn update_with<R>(
        &self,
        id: &SessionId,
        change: impl FnOnce(&mut SessionState) -> R,
    ) -> Option<R> {
        let now = now_epoch_ms();
        let mut sessions = self.sessions.write();
        match sessions.get_mut(id) {
            Some(current) if !self.is_expired(current, now) => {
                let result = change(current);
                current.last_seen_at = now;
                Some(result)
            }
            _ => None,
        }
    }

    /// Replaces the stored state and refreshes `last_seen_at`.
    ///
    /// Returns `false` when the session no longer exists; the state is not
    /// resurrected in that case.
    pub fn update(&self, id: &SessionId, state: SessionState) -> bool {
        self.update_with(id, |current| *current = state).is_some()
    }

    /// Refreshes `last_seen_at` without changing state.
    pub fn touch(&self, id: &SessionId) -> bool {
        self.update_with(id, |_| ()).is_some()
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_epoch_ms();
        let mut sessions = self.sessions.write();
        self.sweep(&mut sessions, now)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn sweep_due(&self, now: i64) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        let interval = duration_ms(timeout.min(SWEEP_INTERVAL));
        now.saturating_sub(self.last_sweep_ms.load(Ordering::Relaxed)) >= interval
    }

    fn sweep(&self, sessions: &mut HashMap<SessionId, SessionState>, now: i64) -> usize {
        self.last_sweep_ms.store(now, Ordering::Relaxed);
        let before = sessions.len();
        sessions.retain(|_, state| !self.is_expired(state, now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("event=session_purge module=security status=ok removed={removed}");
        }
        removed
    }

    fn is_expired(&self, state: &SessionState, now: i64) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        now.saturating_sub(state.last_seen_at) > duration_ms(timeout)
    }
}

fn evict_least_recent(sessions: &mut HashMap<SessionId, SessionState>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, state)| state.last_seen_at)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        sessions.remove(&id);
        debug!("event=session_evict module=security status=ok reason=capacity");
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
