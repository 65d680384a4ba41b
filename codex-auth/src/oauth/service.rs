use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::Instrument;

use super::callback_url::parse_callback_url;
use super::id_token::TokenClaims;
use super::listener;
use super::models::{ExchangeClaim, OAuthSession, OAuthStatus, SessionStatus};
use super::session_store::{state_prefix, SessionStore};
use super::token_client::OAuthClient;
use crate::common::{AccountId, TokenUpdate};
use crate::config::{CallbackConfiguration, Configuration};
use crate::error::AuthError;
use crate::store::AccountStore;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Authorization URL and the state token correlating its redirect
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationStart {
    pub url: String,
    pub state: String,
}

/// Drives the authorization-code flow for stored accounts.
///
/// Both the embedded listener and manual URL submission funnel into
/// [`CodexOAuthService::complete_oauth`]; the session store's
/// pending-to-exchanging transition decides which of them redeems the code.
pub struct CodexOAuthService {
    sessions: Arc<SessionStore>,
    oauth_client: Arc<OAuthClient>,
    accounts: Arc<dyn AccountStore>,
    callback: CallbackConfiguration,
    exchange_timeout: Duration,
    listener: OnceCell<Result<SocketAddr, String>>,
}

impl CodexOAuthService {
    pub fn new(
        config: &Configuration,
        oauth_client: Arc<OAuthClient>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.oauth.session_ttl())),
            oauth_client,
            accounts,
            callback: config.callback.clone(),
            exchange_timeout: config.oauth.exchange_timeout(),
            listener: OnceCell::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start the callback listener once per process.
    ///
    /// A bind failure is cached and returned to every later caller.
    pub async fn ensure_callback_server(self: &Arc<Self>) -> Result<SocketAddr, AuthError> {
        let service = Arc::clone(self);
        let outcome = self
            .listener
            .get_or_init(|| async move {
                let config = service.callback.clone();
                listener::spawn(service, &config).await
            })
            .await;

        outcome.clone().map_err(AuthError::ListenerBind)
    }

    /// Begin authorization for an account
    pub async fn start(
        self: &Arc<Self>,
        account_id: AccountId,
    ) -> Result<AuthorizationStart, AuthError> {
        if account_id == 0 {
            return Err(AuthError::InvalidInput("account id is required".to_string()));
        }

        self.ensure_callback_server().await?;

        let (state, pkce) = self.sessions.create(account_id)?;
        let url = self.oauth_client.build_authorization_url(&state, &pkce);

        tracing::info!(
            account_id,
            state = %state_prefix(&state),
            "Initiated OAuth session"
        );

        Ok(AuthorizationStart { url, state })
    }

    pub fn get_status(&self, state: &str) -> OAuthStatus {
        self.sessions.status(state.trim())
    }

    /// Complete a session from a redirect's `state`, `code` and `error` values.
    ///
    /// Returns the session status this call observed last. A call that loses
    /// the race to another completion path gets that path's status back
    /// without touching the token endpoint.
    pub async fn complete_oauth(
        &self,
        state: &str,
        code: &str,
        provider_error: &str,
    ) -> Result<SessionStatus, AuthError> {
        let (state, code, provider_error) = (state.trim(), code.trim(), provider_error.trim());

        if !provider_error.is_empty() {
            let message = format!("authorization denied: {}", provider_error);
            self.sessions.fail_if_pending(state, message.clone());
            return Err(AuthError::OAuth(message));
        }

        if state.is_empty() || code.is_empty() {
            let message = "missing code or state".to_string();
            self.sessions.fail_if_pending(state, message.clone());
            return Err(AuthError::InvalidInput(message));
        }

        let session = match self.sessions.begin_exchange(state)? {
            ExchangeClaim::Claimed(session) => session,
            ExchangeClaim::AlreadyHandled(status) => {
                tracing::debug!(
                    state = %state_prefix(state),
                    status = ?status,
                    "OAuth session already handled"
                );
                return Ok(status);
            }
        };

        match self.redeem(&session, code).await {
            Ok(()) => {
                self.sessions.update_status(state, SessionStatus::Success);
                tracing::info!(account_id = session.account_id, "OAuth authorization completed");
                Ok(SessionStatus::Success)
            }
            Err(e) => {
                self.sessions
                    .update_status(state, SessionStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Completion bounded by the exchange timeout.
    ///
    /// Succeeds only once the session is terminal and successful. A caller
    /// that lost the race waits for the winner's outcome.
    pub(crate) async fn complete_with_timeout(
        &self,
        state: &str,
        code: &str,
        provider_error: &str,
    ) -> Result<(), AuthError> {
        let settle = async {
            match self.complete_oauth(state, code, provider_error).await? {
                SessionStatus::Pending | SessionStatus::Exchanging => {
                    self.wait_for_terminal(state.trim()).await
                }
                status => Ok(status),
            }
        };

        match tokio::time::timeout(self.exchange_timeout, settle).await {
            Ok(Ok(SessionStatus::Success)) => Ok(()),
            Ok(Ok(SessionStatus::Failed(message))) => Err(AuthError::OAuth(message)),
            Ok(Ok(status)) => Err(AuthError::OAuth(format!(
                "authorization did not settle: {:?}",
                status
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let message = "token exchange timed out".to_string();
                self.sessions
                    .update_status(state.trim(), SessionStatus::Failed(message.clone()));
                Err(AuthError::OAuth(message))
            }
        }
    }

    /// Wait for the path that claimed the session to finish its exchange
    async fn wait_for_terminal(&self, state: &str) -> Result<SessionStatus, AuthError> {
        loop {
            let session = self.sessions.get(state).ok_or(AuthError::SessionNotFound)?;
            if session.status.is_terminal() {
                return Ok(session.status);
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }

    /// Complete a session from a callback URL pasted by an operator.
    ///
    /// A state carried in the URL takes precedence over `state`. Completion
    /// failures are reported through the returned projection; only
    /// unparseable input is an error.
    pub async fn process_callback_url(
        &self,
        state: &str,
        raw_url: &str,
    ) -> Result<OAuthStatus, AuthError> {
        let params = parse_callback_url(raw_url)?;
        let state = if params.state.is_empty() {
            state.trim().to_string()
        } else {
            params.state
        };

        if state.is_empty() {
            return Err(AuthError::InvalidInput("state is required".to_string()));
        }

        let span = tracing::info_span!("oauth_manual_callback", state = %state_prefix(&state));
        if let Err(e) = self
            .complete_with_timeout(&state, &params.code, &params.error)
            .instrument(span)
            .await
        {
            tracing::warn!(state = %state_prefix(&state), error = %e, "Manual OAuth callback failed");
        }

        Ok(self.sessions.status(&state))
    }

    async fn redeem(&self, session: &OAuthSession, code: &str) -> Result<(), AuthError> {
        let tokens = self
            .oauth_client
            .exchange_code(code, &session.pkce.code_verifier)
            .await?;

        let claims = tokens
            .id_token
            .as_deref()
            .map(TokenClaims::from_token)
            .unwrap_or_default();

        let account = self.accounts.get_account(session.account_id).await?;
        if let Some(token_email) = claims.email.as_deref() {
            if !token_email.eq_ignore_ascii_case(account.email.trim()) {
                return Err(AuthError::EmailMismatch {
                    token_email: token_email.to_string(),
                    account_email: account.email.clone(),
                });
            }
        }

        self.accounts
            .save_account_tokens(
                session.account_id,
                TokenUpdate {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    expires_at: tokens.expires_at,
                    chatgpt_account_id: claims.chatgpt_account_id,
                    plan: claims.plan,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Account;
    use crate::oauth::models::OAuthStatusKind;
    use crate::store::InMemoryAccountStore;

    fn service() -> Arc<CodexOAuthService> {
        service_on_port(0)
    }

    fn service_on_port(port: u16) -> Arc<CodexOAuthService> {
        let mut config = Configuration::default();
        config.callback.host = "127.0.0.1".to_string();
        config.callback.port = port;

        let accounts = InMemoryAccountStore::new();
        accounts.insert(Account::new(1, "user@example.com"));
        let client = OAuthClient::new(&config.oauth).unwrap();

        Arc::new(CodexOAuthService::new(
            &config,
            Arc::new(client),
            Arc::new(accounts),
        ))
    }

    #[tokio::test]
    async fn start_rejects_empty_account() {
        let err = service().start(0).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn start_returns_url_bound_to_state() {
        let service = service();
        let started = service.start(1).await.unwrap();

        assert!(started.url.contains(&format!("state={}", started.state)));
        let status = service.get_status(&started.state);
        assert_eq!(status.status, OAuthStatusKind::Pending);
        assert_eq!(status.account_id, Some(1));
    }

    #[tokio::test]
    async fn listener_start_is_idempotent() {
        let service = service();
        let first = service.ensure_callback_server().await.unwrap();
        let second = service.ensure_callback_server().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn bind_failure_is_cached_for_later_starts() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();
        let service = service_on_port(port);

        let first = match service.start(1).await {
            Err(AuthError::ListenerBind(message)) => message,
            other => panic!("expected bind failure, got {other:?}"),
        };
        let second = match service.start(1).await {
            Err(AuthError::ListenerBind(message)) => message,
            other => panic!("expected bind failure, got {other:?}"),
        };
        assert_eq!(first, second);
        assert!(matches!(
            service.ensure_callback_server().await,
            Err(AuthError::ListenerBind(_))
        ));
    }

    #[tokio::test]
    async fn completion_losing_the_race_waits_for_failure() {
        let service = service();
        let (state, _) = service.sessions().create(1).unwrap();
        service.sessions().begin_exchange(&state).unwrap();

        let waiter = {
            let service = Arc::clone(&service);
            let state = state.clone();
            tokio::spawn(async move { service.complete_with_timeout(&state, "code", "").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        service
            .sessions()
            .update_status(&state, SessionStatus::Failed("invalid_grant".to_string()));
        match waiter.await.unwrap() {
            Err(AuthError::OAuth(message)) => assert_eq!(message, "invalid_grant"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completion_losing_the_race_waits_for_success() {
        let service = service();
        let (state, _) = service.sessions().create(1).unwrap();
        service.sessions().begin_exchange(&state).unwrap();

        let waiter = {
            let service = Arc::clone(&service);
            let state = state.clone();
            tokio::spawn(async move { service.complete_with_timeout(&state, "code", "").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.sessions().update_status(&state, SessionStatus::Success);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn provider_error_fails_session_without_exchange() {
        let service = service();
        let (state, _) = service.sessions().create(1).unwrap();

        let err = service
            .complete_oauth(&state, "", "access_denied")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OAuth(_)));

        let status = service.get_status(&state);
        assert_eq!(status.status, OAuthStatusKind::Failed);
        assert!(status.message.unwrap().contains("access_denied"));
    }

    #[tokio::test]
    async fn missing_code_marks_session_failed() {
        let service = service();
        let (state, _) = service.sessions().create(1).unwrap();

        let err = service.complete_oauth(&state, " ", "").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        assert_eq!(service.get_status(&state).status, OAuthStatusKind::Failed);
    }

    #[tokio::test]
    async fn unknown_state_is_session_not_found() {
        let err = service()
            .complete_oauth("unknown", "code", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn manual_submission_reports_provider_error_in_projection() {
        let service = service();
        let (state, _) = service.sessions().create(1).unwrap();

        let url = format!("http://localhost/?error=access_denied&state={}", state);
        let status = service.process_callback_url("", &url).await.unwrap();
        assert_eq!(status.status, OAuthStatusKind::Failed);
        assert_eq!(status.account_id, Some(1));
    }

    #[tokio::test]
    async fn manual_submission_without_any_state_is_invalid() {
        let err = service()
            .process_callback_url("  ", "http://localhost/?code=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }
}
