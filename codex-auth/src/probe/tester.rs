use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

use crate::common::{AccountId, AccountStatus, AccountTestResult, TokenSet, TokenUpdate};
use crate::config::ProbeConfiguration;
use crate::error::{truncate_body, AuthError};
use crate::oauth::{OAuthClient, TokenClaims};
use crate::store::AccountStore;

#[derive(Debug, Default, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    slug: String,
}

/// Upstream verdict on one access token
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeOutcome {
    Valid(Vec<String>),
    Unauthorized,
    Forbidden,
    RateLimited,
    Failed(String),
}

/// Why a refresh attempt produced no usable token
#[derive(Debug)]
enum RefreshFailure {
    /// Provider rejected the refresh grant
    Grant(AuthError),
    /// Grant succeeded but the new tokens were not persisted
    Store(AuthError),
}

impl RefreshFailure {
    fn verdict(&self, context: &str) -> (AccountStatus, String) {
        match self {
            RefreshFailure::Grant(e) => (
                AccountStatus::Expired,
                format!("{} and refresh failed: {}", context, e),
            ),
            RefreshFailure::Store(e) => (
                AccountStatus::Error,
                format!("Token refreshed but could not be saved: {}", e),
            ),
        }
    }
}

/// Checks stored credentials against the provider's models endpoint
pub struct AccountTester {
    accounts: Arc<dyn AccountStore>,
    oauth_client: Arc<OAuthClient>,
    http_client: reqwest::Client,
    models_url: String,
    user_agent: String,
}

impl AccountTester {
    pub fn new(
        config: &ProbeConfiguration,
        oauth_client: Arc<OAuthClient>,
        accounts: Arc<dyn AccountStore>,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            accounts,
            oauth_client,
            http_client,
            models_url: config.models_url.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Probe one account, refreshing its token at most once.
    ///
    /// Only a failure to load the account is returned as an error; every
    /// upstream outcome is reported in the result and written back as the
    /// account's status.
    pub async fn test_account(&self, id: AccountId) -> Result<AccountTestResult, AuthError> {
        let account = self.accounts.get_account(id).await?;

        let mut result = AccountTestResult {
            id,
            email: account.email.clone(),
            status: AccountStatus::Error,
            valid: false,
            message: String::new(),
            models: Vec::new(),
            token_refreshed: false,
            tested_at: Utc::now(),
        };

        let refresh_token = account.refresh_token().map(str::to_string);

        let access_token = match (account.access_token(), refresh_token.as_deref()) {
            (Some(token), _) => token.to_string(),
            (None, None) => {
                let message = AuthError::NoCredentials.to_string();
                return Ok(self.finish(result, AccountStatus::Expired, message).await);
            }
            (None, Some(refresh_token)) => match self.refresh_account(id, refresh_token).await {
                Ok(token) => {
                    result.token_refreshed = true;
                    token
                }
                Err(failure) => {
                    let (status, message) = failure.verdict("No access token");
                    return Ok(self.finish(result, status, message).await);
                }
            },
        };

        let mut outcome = self.probe(&access_token).await;

        if outcome == ProbeOutcome::Unauthorized && !result.token_refreshed {
            if let Some(refresh_token) = refresh_token.as_deref() {
                tracing::debug!(account_id = id, "Access token rejected, refreshing");
                match self.refresh_account(id, refresh_token).await {
                    Ok(token) => {
                        result.token_refreshed = true;
                        outcome = self.probe(&token).await;
                    }
                    Err(failure) => {
                        let (status, message) = failure.verdict("Token expired");
                        return Ok(self.finish(result, status, message).await);
                    }
                }
            }
        }

        let (status, message) = match outcome {
            ProbeOutcome::Valid(models) => {
                result.valid = true;
                result.models = models;
                let message = if result.token_refreshed {
                    "Token refreshed, account is valid"
                } else {
                    "Account is valid"
                };
                (AccountStatus::Active, message.to_string())
            }
            ProbeOutcome::Unauthorized => (AccountStatus::Expired, "Token expired".to_string()),
            ProbeOutcome::Forbidden => (AccountStatus::Banned, "Account is banned".to_string()),
            ProbeOutcome::RateLimited => (
                AccountStatus::RateLimited,
                "Rate limited, try again later".to_string(),
            ),
            ProbeOutcome::Failed(message) => (AccountStatus::Error, message),
        };

        Ok(self.finish(result, status, message).await)
    }

    /// Exchange a refresh token and write the new grant through to the store
    async fn refresh_account(
        &self,
        id: AccountId,
        refresh_token: &str,
    ) -> Result<String, RefreshFailure> {
        let tokens = self
            .oauth_client
            .refresh_access_token(refresh_token)
            .await
            .map_err(|e| {
                tracing::warn!(account_id = id, error = %e, "Token refresh failed");
                RefreshFailure::Grant(e)
            })?;
        let access_token = tokens.access_token.clone();

        self.accounts
            .save_account_tokens(id, refreshed_update(tokens))
            .await
            .map_err(|e| {
                tracing::error!(account_id = id, error = %e, "Failed to save refreshed tokens");
                RefreshFailure::Store(e)
            })?;

        tracing::info!(account_id = id, "Refreshed account token");
        Ok(access_token)
    }

    async fn probe(&self, access_token: &str) -> ProbeOutcome {
        let response = self
            .http_client
            .get(&self.models_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::Failed(format!("Request failed: {}", e)),
        };

        match response.status() {
            StatusCode::OK => {
                let models = response
                    .json::<ModelsResponse>()
                    .await
                    .unwrap_or_default()
                    .models
                    .into_iter()
                    .map(|m| m.slug)
                    .filter(|slug| !slug.is_empty())
                    .collect();
                ProbeOutcome::Valid(models)
            }
            StatusCode::UNAUTHORIZED => ProbeOutcome::Unauthorized,
            StatusCode::FORBIDDEN => ProbeOutcome::Forbidden,
            StatusCode::TOO_MANY_REQUESTS => ProbeOutcome::RateLimited,
            status => {
                let body = response.text().await.unwrap_or_default();
                ProbeOutcome::Failed(format!(
                    "Unexpected status {}: {}",
                    status.as_u16(),
                    truncate_body(&body)
                ))
            }
        }
    }

    async fn finish(
        &self,
        mut result: AccountTestResult,
        status: AccountStatus,
        message: String,
    ) -> AccountTestResult {
        if let Err(e) = self.accounts.set_account_status(result.id, status).await {
            tracing::warn!(account_id = result.id, error = %e, "Failed to record account status");
        }

        tracing::info!(
            account_id = result.id,
            status = %status,
            token_refreshed = result.token_refreshed,
            "Account tested"
        );

        result.status = status;
        result.message = message;
        result.tested_at = Utc::now();
        result
    }
}

/// Store update for a refresh grant; the plan comes from the new ID token,
/// falling back to the access token's own claims
fn refreshed_update(tokens: TokenSet) -> TokenUpdate {
    let id_claims = tokens
        .id_token
        .as_deref()
        .map(TokenClaims::from_token)
        .unwrap_or_default();
    let plan = id_claims
        .plan
        .or_else(|| TokenClaims::from_token(&tokens.access_token).plan);

    TokenUpdate {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: tokens.expires_at,
        chatgpt_account_id: id_claims.chatgpt_account_id,
        plan,
    }
}
