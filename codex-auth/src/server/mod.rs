pub mod error;
pub mod handlers;
pub mod models;

pub use error::ServerError;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::oauth::CodexOAuthService;
use crate::probe::{AccountTester, BatchCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<CodexOAuthService>,
    pub tester: Arc<AccountTester>,
    pub batches: Arc<BatchCoordinator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/oauth/codex/start", post(handlers::start_oauth))
        .route("/oauth/codex/status/{state}", get(handlers::oauth_status))
        .route("/oauth/codex/callback", post(handlers::submit_callback))
        .route("/accounts/{id}/test", post(handlers::test_account))
        .route("/accounts/batch-test", post(handlers::batch_test))
        .route("/accounts/batch-test/{task_id}", get(handlers::batch_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
