use chrono::{DateTime, Utc};
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, Scope,
};
use serde::Deserialize;

use super::pkce::PkceCodes;
use crate::common::TokenSet;
use crate::config::OAuthConfiguration;
use crate::error::AuthError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Client for the provider's authorize and token endpoints.
///
/// Authorization URLs are built with `oauth2`; the grants themselves are
/// plain form posts so non-2xx statuses and bodies reach the caller intact.
pub struct OAuthClient {
    client_id: String,
    auth_url: AuthUrl,
    token_url: String,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfiguration) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(config.auth_url.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;

        url::Url::parse(&config.token_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid token URL: {}", e)))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URI: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.exchange_timeout())
            .build()?;

        Ok(Self {
            client_id: config.client_id.clone(),
            auth_url,
            token_url: config.token_url.clone(),
            redirect_url,
            scopes: config
                .scopes
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            http_client,
        })
    }

    /// Build the browser-facing authorization URL for one session
    pub fn build_authorization_url(&self, state: &str, pkce: &PkceCodes) -> String {
        let csrf_token = CsrfToken::new(state.to_string());
        let verifier = PkceCodeVerifier::new(pkce.code_verifier.clone());

        let (auth_url, _) = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .authorize_url(|| csrf_token)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(PkceCodeChallenge::from_code_verifier_sha256(&verifier))
            .add_extra_param("prompt", "login")
            .add_extra_param("id_token_add_organizations", "true")
            .add_extra_param("codex_cli_simplified_flow", "true")
            .url();

        auth_url.to_string()
    }

    /// Redeem an authorization code together with its PKCE verifier
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("code_verifier", verifier),
        ];

        let tokens = self.post_token_form(&form).await?;
        tracing::debug!(
            has_refresh_token = tokens.refresh_token.is_some(),
            "Successfully exchanged code for tokens"
        );
        Ok(tokens)
    }

    /// Trade a refresh token for a new access token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let scope = self.scopes.join(" ");
        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];

        let tokens = self.post_token_form(&form).await?;
        tracing::debug!(expires_at = ?tokens.expires_at, "Successfully refreshed tokens");
        Ok(tokens)
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenSet, AuthError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::upstream(status.as_u16(), &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AuthError::OAuth("token response missing access_token".to_string()))?;

        let expires_at = expiry_after(parsed.expires_in, Utc::now());

        Ok(TokenSet {
            access_token,
            refresh_token: parsed.refresh_token.filter(|t| !t.trim().is_empty()),
            id_token: parsed.id_token.filter(|t| !t.trim().is_empty()),
            expires_at,
        })
    }
}

/// Absolute expiry for a relative `expires_in`; absent when non-positive or unrepresentable
fn expiry_after(expires_in: Option<i64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .filter(|secs| *secs > 0)
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
}
