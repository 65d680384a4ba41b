use thiserror::Error;

/// Upstream bodies attached to errors are cut to this many characters.
pub(crate) const UPSTREAM_BODY_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid or expired state")]
    SessionNotFound,

    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email mismatch: token={token_email} account={account_email}")]
    EmailMismatch {
        token_email: String,
        account_email: String,
    },

    #[error("No access token and no refresh token")]
    NoCredentials,

    #[error("Callback listener failed to start: {0}")]
    ListenerBind(String),

    #[error("Entropy source failure: {0}")]
    Entropy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl AuthError {
    pub(crate) fn upstream(status: u16, body: &str) -> Self {
        AuthError::Upstream {
            status,
            body: truncate_body(body),
        }
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(UPSTREAM_BODY_LIMIT).collect()
}
