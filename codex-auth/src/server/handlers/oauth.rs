use axum::{
    extract::{Path, State},
    Json,
};

use crate::oauth::{AuthorizationStart, OAuthStatus};
use crate::server::{
    error::ServerError,
    models::{CallbackSubmission, StartRequest},
    AppState,
};

pub async fn start_oauth(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<AuthorizationStart>, ServerError> {
    let started = state.oauth.start(req.account_id).await?;
    Ok(Json(started))
}

pub async fn oauth_status(
    State(state): State<AppState>,
    Path(oauth_state): Path<String>,
) -> Json<OAuthStatus> {
    Json(state.oauth.get_status(&oauth_state))
}

pub async fn submit_callback(
    State(state): State<AppState>,
    Json(req): Json<CallbackSubmission>,
) -> Result<Json<OAuthStatus>, ServerError> {
    tracing::debug!("Manual OAuth callback submitted");

    let status = state
        .oauth
        .process_callback_url(&req.state, &req.callback_url)
        .await?;

    Ok(Json(status))
}
