#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;

use codex_auth::{
    AccountTester, BatchCoordinator, CodexOAuthService, Configuration, InMemoryAccountStore,
    OAuthClient,
};

/// Engine wired against a mock provider
pub struct Harness {
    pub accounts: Arc<InMemoryAccountStore>,
    pub oauth: Arc<CodexOAuthService>,
    pub tester: Arc<AccountTester>,
    pub batches: Arc<BatchCoordinator>,
}

pub fn test_configuration(provider_url: &str) -> Configuration {
    let mut configuration = Configuration::default();
    configuration.callback.host = "127.0.0.1".to_string();
    configuration.callback.port = 0;
    configuration.oauth.auth_url = format!("{}/oauth/authorize", provider_url);
    configuration.oauth.token_url = format!("{}/oauth/token", provider_url);
    configuration.oauth.exchange_timeout_seconds = 5;
    configuration.probe.models_url = format!("{}/backend-api/models", provider_url);
    configuration.probe.timeout_seconds = 5;
    configuration
}

pub fn harness(provider_url: &str, accounts: InMemoryAccountStore) -> Harness {
    let configuration = test_configuration(provider_url);
    let accounts = Arc::new(accounts);

    let oauth_client = Arc::new(OAuthClient::new(&configuration.oauth).unwrap());
    let oauth = Arc::new(CodexOAuthService::new(
        &configuration,
        Arc::clone(&oauth_client),
        accounts.clone(),
    ));
    let tester = Arc::new(
        AccountTester::new(&configuration.probe, oauth_client, accounts.clone()).unwrap(),
    );
    let batches = Arc::new(BatchCoordinator::new(
        &configuration.probe,
        Arc::clone(&tester),
    ));

    Harness {
        accounts,
        oauth,
        tester,
        batches,
    }
}

/// Unsigned JWT carrying `payload` as its claims
pub fn jwt(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}
