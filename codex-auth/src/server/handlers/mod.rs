mod accounts;
mod oauth;

pub use accounts::{batch_result, batch_test, test_account};
pub use oauth::{oauth_status, start_oauth, submit_callback};

use crate::server::models::HealthResponse;
use axum::Json;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
