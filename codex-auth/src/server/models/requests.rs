use serde::{Deserialize, Serialize};

use crate::common::AccountId;

// POST /oauth/codex/start
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub account_id: AccountId,
}

// POST /oauth/codex/callback
#[derive(Debug, Deserialize)]
pub struct CallbackSubmission {
    #[serde(default)]
    pub state: String,
    pub callback_url: String,
}

// POST /accounts/batch-test
#[derive(Debug, Deserialize)]
pub struct BatchTestRequest {
    #[serde(default)]
    pub ids: Vec<AccountId>,
}

#[derive(Debug, Serialize)]
pub struct BatchTestResponse {
    pub task_id: String,
}

// Health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
