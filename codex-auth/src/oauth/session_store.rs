use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::models::{ExchangeClaim, OAuthSession, OAuthStatus, SessionStatus};
use super::pkce::{generate_pkce_codes, generate_state, PkceCodes};
use crate::common::AccountId;
use crate::error::AuthError;

/// In-flight OAuth attempts keyed by their state token.
///
/// Expired entries are purged opportunistically on every access and by
/// [`run_session_sweeper`]. A session is only ever observed as expired,
/// never stored as such.
pub struct SessionStore {
    sessions: Arc<DashMap<String, OAuthSession>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        tracing::info!(
            "Session store initialized with TTL of {} seconds",
            ttl.num_seconds()
        );
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Create a pending session with fresh PKCE codes and state
    pub fn create(&self, account_id: AccountId) -> Result<(String, PkceCodes), AuthError> {
        let pkce = generate_pkce_codes()?;
        let state = generate_state()?;
        let now = Utc::now();
        self.purge_expired(now);

        let session = OAuthSession {
            state: state.clone(),
            account_id,
            pkce: pkce.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            status: SessionStatus::Pending,
        };
        self.sessions.insert(state.clone(), session);
        tracing::debug!(
            account_id,
            state = %state_prefix(&state),
            "Created OAuth session"
        );
        Ok((state, pkce))
    }

    /// Get a live session; expired sessions are evicted and reported absent
    pub fn get(&self, state: &str) -> Option<OAuthSession> {
        self.get_at(state, Utc::now())
    }

    pub(crate) fn get_at(&self, state: &str, now: DateTime<Utc>) -> Option<OAuthSession> {
        self.purge_expired(now);
        self.sessions
            .get(state)
            .filter(|s| !s.is_expired_at(now))
            .map(|s| s.clone())
    }

    /// Status projection; missing and expired sessions read as expired
    pub fn status(&self, state: &str) -> OAuthStatus {
        self.status_at(state, Utc::now())
    }

    pub(crate) fn status_at(&self, state: &str, now: DateTime<Utc>) -> OAuthStatus {
        self.purge_expired(now);
        let Some(session) = self.sessions.get(state).map(|s| s.clone()) else {
            return OAuthStatus::expired("Session expired or not found");
        };

        if session.is_expired_at(now) {
            self.sessions.remove(state);
            return OAuthStatus::expired("Session expired");
        }

        OAuthStatus::from_session(&session)
    }

    /// Atomically move a session from pending to exchanging.
    ///
    /// Exactly one caller per session gets [`ExchangeClaim::Claimed`].
    pub fn begin_exchange(&self, state: &str) -> Result<ExchangeClaim, AuthError> {
        let now = Utc::now();
        self.purge_expired(now);

        let mut session = self
            .sessions
            .get_mut(state)
            .filter(|s| !s.is_expired_at(now))
            .ok_or(AuthError::SessionNotFound)?;

        if session.status != SessionStatus::Pending {
            return Ok(ExchangeClaim::AlreadyHandled(session.status.clone()));
        }

        session.status = SessionStatus::Exchanging;
        Ok(ExchangeClaim::Claimed(session.clone()))
    }

    /// Set the status of a non-terminal session. Terminal statuses never revert.
    pub fn update_status(&self, state: &str, status: SessionStatus) -> bool {
        self.purge_expired(Utc::now());
        let updated = self
            .sessions
            .get_mut(state)
            .map(|mut s| {
                if s.status.is_terminal() {
                    return false;
                }
                s.status = status.clone();
                true
            })
            .unwrap_or(false);

        if updated {
            match &status {
                SessionStatus::Failed(msg) => {
                    tracing::warn!(state = %state_prefix(state), "OAuth session failed: {}", msg)
                }
                other => {
                    tracing::debug!(state = %state_prefix(state), status = ?other, "OAuth session updated")
                }
            }
        }
        updated
    }

    /// Fail a session nobody has started exchanging yet
    pub fn fail_if_pending(&self, state: &str, message: String) -> bool {
        self.purge_expired(Utc::now());
        let updated = self
            .sessions
            .get_mut(state)
            .map(|mut s| {
                if s.status != SessionStatus::Pending {
                    return false;
                }
                s.status = SessionStatus::Failed(message.clone());
                true
            })
            .unwrap_or(false);

        if updated {
            tracing::warn!(state = %state_prefix(state), "OAuth session failed: {}", message);
        }
        updated
    }

    /// Drop every session past its deadline, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let initial_count = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        initial_count.saturating_sub(self.sessions.len())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Background task that periodically purges expired sessions
pub async fn run_session_sweeper(store: Arc<SessionStore>, interval: Duration) {
    let mut interval = tokio::time::interval(interval);
    loop {
        interval.tick().await;
        let cleaned = store.purge_expired(Utc::now());
        if cleaned > 0 {
            tracing::info!(
                "Cleaned up {} expired sessions, {} remaining",
                cleaned,
                store.session_count()
            );
        }
    }
}

pub(crate) fn state_prefix(state: &str) -> String {
    state.chars().take(8).collect()
}
