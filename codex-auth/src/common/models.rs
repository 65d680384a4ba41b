use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Pending,
    Active,
    Expired,
    Banned,
    RateLimited,
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Expired => "expired",
            AccountStatus::Banned => "banned",
            AccountStatus::RateLimited => "rate_limited",
            AccountStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored credentials for one provider account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub chatgpt_account_id: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn new(id: AccountId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            access_token: None,
            refresh_token: None,
            chatgpt_account_id: None,
            plan: None,
            token_expires_at: None,
            status: AccountStatus::Pending,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        non_blank(self.access_token.as_deref())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_blank(self.refresh_token.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Write-through update applied to an account after a code or refresh grant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub chatgpt_account_id: Option<String>,
    pub plan: Option<String>,
}

/// Outcome of probing one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTestResult {
    pub id: AccountId,
    #[serde(default)]
    pub email: String,
    pub status: AccountStatus,
    pub valid: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub token_refreshed: bool,
    pub tested_at: DateTime<Utc>,
}

impl AccountTestResult {
    pub fn error(id: AccountId, message: impl Into<String>) -> Self {
        Self {
            id,
            email: String::new(),
            status: AccountStatus::Error,
            valid: false,
            message: message.into(),
            models: Vec::new(),
            token_refreshed: false,
            tested_at: Utc::now(),
        }
    }
}

/// Progress and results of one batch verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTask {
    pub task_id: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: bool,
    pub results: Vec<AccountTestResult>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
