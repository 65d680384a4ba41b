use axum::{
    extract::{Path, State},
    Json,
};

use crate::common::{AccountId, AccountTestResult, BatchTask};
use crate::server::{
    error::ServerError,
    models::{BatchTestRequest, BatchTestResponse},
    AppState,
};

pub async fn test_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> Result<Json<AccountTestResult>, ServerError> {
    let result = state.tester.test_account(id).await?;
    Ok(Json(result))
}

pub async fn batch_test(
    State(state): State<AppState>,
    Json(req): Json<BatchTestRequest>,
) -> Result<Json<BatchTestResponse>, ServerError> {
    let task_id = state.batches.batch_test_accounts(req.ids)?;
    Ok(Json(BatchTestResponse { task_id }))
}

pub async fn batch_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<BatchTask>, ServerError> {
    let task = state.batches.get_batch_test_result(&task_id)?;
    Ok(Json(task))
}
