use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;

use crate::common::{Account, AccountId, AccountStatus, TokenUpdate};
use crate::error::AuthError;

/// Source of truth for account credentials.
///
/// The engine never caches what it reads from here: every mutation is
/// written through immediately, and concurrent writers to the same account
/// get whatever the implementation's own semantics are (last write wins for
/// [`InMemoryAccountStore`]).
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: AccountId) -> Result<Account, AuthError>;

    /// Persist a token grant. Implementations also mark the account active.
    async fn save_account_tokens(&self, id: AccountId, update: TokenUpdate)
        -> Result<(), AuthError>;

    async fn set_account_status(&self, id: AccountId, status: AccountStatus)
        -> Result<(), AuthError>;
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of accounts
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let accounts: Vec<Account> = serde_json::from_str(&json)?;

        let store = Self::new();
        for account in accounts {
            store.insert(account);
        }
        tracing::info!(count = store.len(), "Loaded accounts from {}", path.display());
        Ok(store)
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.id, account);
    }

    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(&self, id: AccountId) -> Result<Account, AuthError> {
        self.get(id)
            .ok_or_else(|| AuthError::NotFound(format!("account {} not found", id)))
    }

    async fn save_account_tokens(
        &self,
        id: AccountId,
        update: TokenUpdate,
    ) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| AuthError::NotFound(format!("account {} not found", id)))?;

        account.access_token = Some(update.access_token);
        account.status = AccountStatus::Active;
        if let Some(refresh_token) = update.refresh_token {
            account.refresh_token = Some(refresh_token);
        }
        if let Some(expires_at) = update.expires_at {
            account.token_expires_at = Some(expires_at);
        }
        if let Some(chatgpt_account_id) = update.chatgpt_account_id {
            account.chatgpt_account_id = Some(chatgpt_account_id);
        }
        if let Some(plan) = update.plan {
            account.plan = Some(plan);
        }
        Ok(())
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| AuthError::NotFound(format!("account {} not found", id)))?;
        account.status = status;
        Ok(())
    }
}
