use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pkce::PkceCodes;
use crate::common::AccountId;

#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub state: String,
    pub account_id: AccountId,
    pub pkce: PkceCodes,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl OAuthSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Stored session status. `Exchanging` marks the single caller that won the
/// right to redeem the authorization code; it is reported as pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Exchanging,
    Success,
    Failed(String),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Success | SessionStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthStatusKind {
    Pending,
    Success,
    Failed,
    Expired,
}

/// Read-only projection returned by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthStatus {
    pub status: OAuthStatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl OAuthStatus {
    pub fn expired(message: &str) -> Self {
        Self {
            status: OAuthStatusKind::Expired,
            message: Some(message.to_string()),
            account_id: None,
        }
    }

    pub fn from_session(session: &OAuthSession) -> Self {
        let (status, message) = match &session.status {
            SessionStatus::Pending | SessionStatus::Exchanging => (OAuthStatusKind::Pending, None),
            SessionStatus::Success => (OAuthStatusKind::Success, None),
            SessionStatus::Failed(msg) => (OAuthStatusKind::Failed, Some(msg.clone())),
        };
        Self {
            status,
            message,
            account_id: Some(session.account_id),
        }
    }
}

/// Result of trying to claim a session for code redemption
#[derive(Debug, Clone)]
pub enum ExchangeClaim {
    /// The caller moved the session from pending to exchanging and must redeem the code.
    Claimed(OAuthSession),
    /// Another completion path already claimed or finished this session.
    AlreadyHandled(SessionStatus),
}
