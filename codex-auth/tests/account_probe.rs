//! Account probing and batch verification against mock provider endpoints

mod common;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use codex_auth::common::TokenUpdate;
use codex_auth::{
    Account, AccountId, AccountStatus, AccountStore, AccountTester, AuthError, BatchTask,
    InMemoryAccountStore, OAuthClient,
};
use common::{harness, test_configuration, Harness};

/// Reads and status writes succeed; token writes are refused
struct ReadOnlyTokens(InMemoryAccountStore);

#[async_trait]
impl AccountStore for ReadOnlyTokens {
    async fn get_account(&self, id: AccountId) -> Result<Account, AuthError> {
        self.0.get_account(id).await
    }

    async fn save_account_tokens(
        &self,
        _id: AccountId,
        _update: TokenUpdate,
    ) -> Result<(), AuthError> {
        Err(AuthError::Configuration("account store is read-only".to_string()))
    }

    async fn set_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<(), AuthError> {
        self.0.set_account_status(id, status).await
    }
}

fn account(id: u64, access_token: Option<&str>, refresh_token: Option<&str>) -> Account {
    let mut account = Account::new(id, format!("user{id}@example.com"));
    account.access_token = access_token.map(str::to_string);
    account.refresh_token = refresh_token.map(str::to_string);
    account
}

fn models_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "models": [{ "slug": "gpt-5" }, { "slug": "gpt-5-codex" }]
    }))
}

async fn mount_models(provider: &MockServer, token: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/backend-api/models"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(response)
        .mount(provider)
        .await;
}

async fn wait_for_batch(h: &Harness, task_id: &str) -> BatchTask {
    for _ in 0..500 {
        let task = h.batches.get_batch_test_result(task_id).unwrap();
        assert!(task.completed <= task.total);
        assert_eq!(task.in_progress, task.finished_at.is_none());
        if !task.in_progress {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch {task_id} did not finish");
}

#[tokio::test]
async fn batch_reports_active_refreshed_and_expired_accounts() {
    let provider = MockServer::start().await;
    mount_models(&provider, "at-valid", models_ok()).await;
    mount_models(&provider, "at-stale", ResponseTemplate::new(401)).await;
    mount_models(&provider, "at-fresh", models_ok()).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-fresh",
            "refresh_token": "rt-3",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let store = InMemoryAccountStore::new();
    store.insert(account(1, Some("at-valid"), None));
    store.insert(account(2, Some("at-stale"), Some("rt-2")));
    store.insert(account(3, None, None));
    let h = harness(&provider.uri(), store);

    let task_id = h.batches.batch_test_accounts(vec![1, 2, 3]).unwrap();
    let task = wait_for_batch(&h, &task_id).await;

    assert_eq!(task.total, 3);
    assert_eq!(task.completed, 3);
    assert!(task.finished_at.is_some());

    let result = |id| task.results.iter().find(|r| r.id == id).unwrap();
    assert_eq!(result(1).status, AccountStatus::Active);
    assert!(!result(1).token_refreshed);
    assert_eq!(result(1).models, vec!["gpt-5", "gpt-5-codex"]);
    assert_eq!(result(2).status, AccountStatus::Active);
    assert!(result(2).token_refreshed);
    assert_eq!(result(3).status, AccountStatus::Expired);

    let refreshed = h.accounts.get(2).unwrap();
    assert_eq!(refreshed.access_token.as_deref(), Some("at-fresh"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rt-3"));
    assert_eq!(h.accounts.get(3).unwrap().status, AccountStatus::Expired);
}

#[tokio::test]
async fn empty_batch_is_invalid_input() {
    let provider = MockServer::start().await;
    let h = harness(&provider.uri(), InMemoryAccountStore::new());
    assert!(matches!(
        h.batches.batch_test_accounts(vec![]),
        Err(AuthError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn unauthorized_without_refresh_token_is_not_retried() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/models"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let store = InMemoryAccountStore::new();
    store.insert(account(1, Some("at-stale"), None));
    let h = harness(&provider.uri(), store);

    let result = h.tester.test_account(1).await.unwrap();
    assert_eq!(result.status, AccountStatus::Expired);
    assert!(!result.token_refreshed);
    assert_eq!(h.accounts.get(1).unwrap().status, AccountStatus::Expired);
}

#[tokio::test]
async fn second_unauthorized_after_refresh_is_not_retried() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/models"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&provider)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-also-rejected"
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let store = InMemoryAccountStore::new();
    store.insert(account(1, Some("at-stale"), Some("rt-1")));
    let h = harness(&provider.uri(), store);

    let result = h.tester.test_account(1).await.unwrap();
    assert_eq!(result.status, AccountStatus::Expired);
    assert!(result.token_refreshed);
    assert!(!result.valid);
}

#[tokio::test]
async fn missing_access_token_is_refreshed_before_probing() {
    let provider = MockServer::start().await;
    mount_models(&provider, "at-new", models_ok()).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("scope=openid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-new",
            "expires_in": 60
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let store = InMemoryAccountStore::new();
    store.insert(account(1, None, Some("rt-1")));
    let h = harness(&provider.uri(), store);

    let result = h.tester.test_account(1).await.unwrap();
    assert_eq!(result.status, AccountStatus::Active);
    assert!(result.token_refreshed);

    let account = h.accounts.get(1).unwrap();
    assert_eq!(account.access_token.as_deref(), Some("at-new"));
    // refresh grant without a rotated token keeps the stored one
    assert_eq!(account.refresh_token.as_deref(), Some("rt-1"));
}

#[tokio::test]
async fn forbidden_rate_limited_and_other_statuses_are_classified() {
    let provider = MockServer::start().await;
    mount_models(&provider, "at-banned", ResponseTemplate::new(403)).await;
    mount_models(&provider, "at-limited", ResponseTemplate::new(429)).await;
    mount_models(
        &provider,
        "at-broken",
        ResponseTemplate::new(500).set_body_string("x".repeat(1000)),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let store = InMemoryAccountStore::new();
    store.insert(account(1, Some("at-banned"), Some("rt")));
    store.insert(account(2, Some("at-limited"), Some("rt")));
    store.insert(account(3, Some("at-broken"), Some("rt")));
    let h = harness(&provider.uri(), store);

    let banned = h.tester.test_account(1).await.unwrap();
    assert_eq!(banned.status, AccountStatus::Banned);

    let limited = h.tester.test_account(2).await.unwrap();
    assert_eq!(limited.status, AccountStatus::RateLimited);

    let broken = h.tester.test_account(3).await.unwrap();
    assert_eq!(broken.status, AccountStatus::Error);
    assert!(broken.message.starts_with("Unexpected status 500: "));
    assert!(broken.message.len() < 300);

    assert_eq!(h.accounts.get(1).unwrap().status, AccountStatus::Banned);
    assert_eq!(h.accounts.get(2).unwrap().status, AccountStatus::RateLimited);
    assert_eq!(h.accounts.get(3).unwrap().status, AccountStatus::Error);
}

#[tokio::test]
async fn refreshed_tokens_that_cannot_be_saved_are_an_error() {
    let provider = MockServer::start().await;
    mount_models(&provider, "at-stale", ResponseTemplate::new(401)).await;
    Mock::given(method("GET"))
        .and(path("/backend-api/models"))
        .and(header("authorization", "Bearer at-fresh"))
        .respond_with(models_ok())
        .expect(0)
        .mount(&provider)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-fresh",
            "refresh_token": "rt-2"
        })))
        .expect(2)
        .mount(&provider)
        .await;

    let inner = InMemoryAccountStore::new();
    inner.insert(account(1, Some("at-stale"), Some("rt-1")));
    inner.insert(account(2, None, Some("rt-1")));
    let store = Arc::new(ReadOnlyTokens(inner));

    let configuration = test_configuration(&provider.uri());
    let client = Arc::new(OAuthClient::new(&configuration.oauth).unwrap());
    let tester = AccountTester::new(&configuration.probe, client, store.clone()).unwrap();

    let rejected = tester.test_account(1).await.unwrap();
    assert_eq!(rejected.status, AccountStatus::Error);
    assert!(!rejected.token_refreshed);
    assert!(rejected.message.contains("read-only"));

    let missing = tester.test_account(2).await.unwrap();
    assert_eq!(missing.status, AccountStatus::Error);
    assert!(!missing.token_refreshed);

    assert_eq!(store.0.get(1).unwrap().status, AccountStatus::Error);
    assert_eq!(store.0.get(1).unwrap().access_token.as_deref(), Some("at-stale"));
    assert_eq!(store.0.get(2).unwrap().status, AccountStatus::Error);
}
