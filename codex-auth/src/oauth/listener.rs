//! Loopback HTTP listener that receives the provider redirect.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Instrument;

use super::service::CodexOAuthService;
use super::session_store::state_prefix;
use crate::config::CallbackConfiguration;

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Authorization Successful</title>
    <style>
        body {
            margin: 0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: #F3F4F6;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
        }
        .container {
            background: white;
            border-radius: 12px;
            padding: 40px;
            box-shadow: 0 8px 32px rgba(0, 0, 0, 0.08);
            text-align: center;
            max-width: 420px;
        }
        h1 {
            color: #047857;
            margin: 0 0 12px 0;
            font-size: 22px;
        }
        p {
            color: #4B5563;
            margin: 0;
            line-height: 1.5;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization Successful</h1>
        <p>The account is connected. This window will close shortly.</p>
    </div>
    <script>
        if (window.opener) {
            window.opener.postMessage({ type: "codex-oauth-callback", success: true }, "*");
        }
        setTimeout(function () { window.close(); }, 2000);
    </script>
</body>
</html>"#;

const ERROR_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Authorization Failed</title>
    <style>
        body {
            margin: 0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: #F3F4F6;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
        }
        .container {
            background: white;
            border-radius: 12px;
            padding: 40px;
            box-shadow: 0 8px 32px rgba(0, 0, 0, 0.08);
            text-align: center;
            max-width: 420px;
        }
        h1 {
            color: #B91C1C;
            margin: 0 0 12px 0;
            font-size: 22px;
        }
        .error-details {
            background: #FEE2E2;
            border-radius: 8px;
            padding: 16px;
            color: #991B1B;
            font-family: monospace;
            font-size: 14px;
            word-break: break-word;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization Failed</h1>
        <div class="error-details">{ERROR_HTML}</div>
    </div>
    <script>
        if (window.opener) {
            window.opener.postMessage({ type: "codex-oauth-callback", success: false, error: {ERROR_JS} }, "*");
        }
    </script>
</body>
</html>"#;

#[derive(Debug, Default, Deserialize)]
struct RedirectParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Bind the configured address and serve redirects in the background.
///
/// Returns the bound address, which differs from the configured one when
/// port 0 is requested.
pub(crate) async fn spawn(
    service: Arc<CodexOAuthService>,
    config: &CallbackConfiguration,
) -> Result<SocketAddr, String> {
    if !config.path.starts_with('/') {
        return Err(format!("callback path must start with '/': {}", config.path));
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("listen on {} failed: {}", addr, e))?;
    let local_addr = listener.local_addr().map_err(|e| e.to_string())?;

    let app = Router::new()
        .route(&config.path, get(handle_redirect))
        .with_state(service);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("OAuth callback listener stopped: {}", e);
        }
    });

    tracing::info!("OAuth callback listener on http://{}{}", local_addr, config.path);
    Ok(local_addr)
}

async fn handle_redirect(
    State(service): State<Arc<CodexOAuthService>>,
    Query(params): Query<RedirectParams>,
) -> Response {
    let state = params.state.unwrap_or_default();
    let code = params.code.unwrap_or_default();
    let error = params
        .error
        .filter(|e| !e.trim().is_empty())
        .or(params.error_description)
        .unwrap_or_default();

    let span = tracing::info_span!("oauth_redirect", state = %state_prefix(&state));

    let outcome = service
        .complete_with_timeout(&state, &code, &error)
        .instrument(span.clone())
        .await;

    let _enter = span.enter();
    match outcome {
        Ok(()) => {
            tracing::info!("OAuth redirect handled");
            (StatusCode::OK, Html(SUCCESS_HTML.to_string())).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "OAuth redirect failed");
            (StatusCode::BAD_REQUEST, Html(error_page(&e.to_string()))).into_response()
        }
    }
}

fn error_page(message: &str) -> String {
    let js = serde_json::to_string(message)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e");

    ERROR_HTML_TEMPLATE
        .replace("{ERROR_HTML}", &escape_html(message))
        .replace("{ERROR_JS}", &js)
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
