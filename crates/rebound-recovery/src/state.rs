//! Per-session recovery bookkeeping.
//!
//! One [`RecoveryState`] is owned by each plugin instance and shared by
//! `Arc`. The inner mutex is never held across an `.await`.

use crate::classify::ParsedLimitError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rebound_config::RetrySettings;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_attempt_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncateState {
    pub attempt: u32,
    pub last_truncated_part_id: Option<String>,
}

/// Point-in-time view of one session, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub pending: bool,
    pub last_error: Option<ParsedLimitError>,
    pub retry_attempt: u32,
    pub truncate_attempt: u32,
    pub empty_content_attempt: u32,
    pub in_progress: bool,
}

#[derive(Debug, Default)]
struct Sessions {
    pending: HashSet<String>,
    last_error: HashMap<String, ParsedLimitError>,
    retry: HashMap<String, RetryState>,
    truncate: HashMap<String, TruncateState>,
    empty_content_attempts: HashMap<String, u32>,
    in_progress: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct RecoveryState {
    inner: Mutex<Sessions>,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an error and mark the session as needing recovery.
    pub fn record_error(&self, session_id: &str, error: ParsedLimitError) {
        let mut inner = self.inner.lock();
        inner.pending.insert(session_id.to_string());
        inner.last_error.insert(session_id.to_string(), error);
    }

    pub fn last_error(&self, session_id: &str) -> Option<ParsedLimitError> {
        self.inner.lock().last_error.get(session_id).cloned()
    }

    pub fn has_error(&self, session_id: &str) -> bool {
        self.inner.lock().last_error.contains_key(session_id)
    }

    pub fn is_pending(&self, session_id: &str) -> bool {
        self.inner.lock().pending.contains(session_id)
    }

    /// Claim the pending flag; returns whether it was set.
    pub fn take_pending(&self, session_id: &str) -> bool {
        self.inner.lock().pending.remove(session_id)
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.inner.lock().in_progress.contains(session_id)
    }

    /// Acquire the per-session run lock. `None` means another run holds it.
    pub fn try_begin_run(&self, session_id: &str) -> Option<SessionRunGuard<'_>> {
        let mut inner = self.inner.lock();
        if !inner.in_progress.insert(session_id.to_string()) {
            return None;
        }
        Some(SessionRunGuard {
            state: self,
            session_id: session_id.to_string(),
        })
    }

    pub fn truncate_attempts(&self, session_id: &str) -> u32 {
        self.inner
            .lock()
            .truncate
            .get(session_id)
            .map(|t| t.attempt)
            .unwrap_or(0)
    }

    /// Consume truncate budget, one unit per record truncated.
    pub fn record_truncations(&self, session_id: &str, count: usize, last_part_id: Option<&str>) {
        let mut inner = self.inner.lock();
        let entry = inner.truncate.entry(session_id.to_string()).or_default();
        entry.attempt = entry.attempt.saturating_add(count as u32);
        if let Some(part_id) = last_part_id {
            entry.last_truncated_part_id = Some(part_id.to_string());
        }
    }

    pub fn empty_content_attempts(&self, session_id: &str) -> u32 {
        self.inner
            .lock()
            .empty_content_attempts
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    /// Take the next repair attempt if fewer than `max_attempts` were used.
    pub fn begin_repair_attempt(&self, session_id: &str, max_attempts: u32) -> Option<u32> {
        let mut inner = self.inner.lock();
        let attempts = inner
            .empty_content_attempts
            .entry(session_id.to_string())
            .or_insert(0);
        if *attempts >= max_attempts {
            return None;
        }
        *attempts += 1;
        Some(*attempts)
    }

    pub fn retry_state(&self, session_id: &str) -> Option<RetryState> {
        self.inner.lock().retry.get(session_id).copied()
    }

    /// Take the next summarize attempt, resetting the counter after a quiet
    /// period. `None` once the budget is spent.
    pub fn begin_summarize_attempt(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        settings: &RetrySettings,
    ) -> Option<u32> {
        let mut inner = self.inner.lock();
        let entry = inner
            .retry
            .entry(session_id.to_string())
            .or_insert(RetryState {
                attempt: 0,
                last_attempt_at: now,
            });

        let quiet = now.signed_duration_since(entry.last_attempt_at);
        if quiet > ChronoDuration::milliseconds(settings.reset_after_ms as i64) {
            tracing::debug!(session_id, "retry budget reset after quiet period");
            entry.attempt = 0;
        }

        if entry.attempt >= settings.max_attempts {
            return None;
        }
        entry.attempt += 1;
        entry.last_attempt_at = now;
        Some(entry.attempt)
    }

    /// Drop every collection for the session at once. The run lock is left
    /// to its guard.
    pub fn clear_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        inner.pending.remove(session_id);
        inner.last_error.remove(session_id);
        inner.retry.remove(session_id);
        inner.truncate.remove(session_id);
        inner.empty_content_attempts.remove(session_id);
    }

    pub fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            pending: inner.pending.contains(session_id),
            last_error: inner.last_error.get(session_id).cloned(),
            retry_attempt: inner.retry.get(session_id).map(|r| r.attempt).unwrap_or(0),
            truncate_attempt: inner.truncate.get(session_id).map(|t| t.attempt).unwrap_or(0),
            empty_content_attempt: inner
                .empty_content_attempts
                .get(session_id)
                .copied()
                .unwrap_or(0),
            in_progress: inner.in_progress.contains(session_id),
        }
    }

    /// Sessions with any recorded state.
    pub fn tracked_sessions(&self) -> usize {
        let inner = self.inner.lock();
        let mut ids: HashSet<&String> = inner.pending.iter().collect();
        ids.extend(inner.last_error.keys());
        ids.extend(inner.retry.keys());
        ids.extend(inner.truncate.keys());
        ids.extend(inner.empty_content_attempts.keys());
        ids.len()
    }
}

/// Holds a session's run lock; releasing it on drop covers every exit path
/// including panics.
#[derive(Debug)]
pub struct SessionRunGuard<'a> {
    state: &'a RecoveryState,
    session_id: String,
}

impl SessionRunGuard<'_> {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionRunGuard<'_> {
    fn drop(&mut self) {
        self.state.inner.lock().in_progress.remove(&self.session_id);
    }
}
