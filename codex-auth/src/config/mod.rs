use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfiguration,
    #[serde(default)]
    pub callback: CallbackConfiguration,
    #[serde(default)]
    pub oauth: OAuthConfiguration,
    #[serde(default)]
    pub probe: ProbeConfiguration,
}

/// Operator API binding.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfiguration {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON array of accounts used to seed the in-memory store.
    #[serde(default)]
    pub accounts_file: Option<String>,
}

/// Embedded listener receiving provider redirects.
#[derive(Debug, Deserialize, Clone)]
pub struct CallbackConfiguration {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_callback_port")]
    pub port: u16,

    #[serde(default = "default_callback_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfiguration {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "default_scopes")]
    pub scopes: String,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,

    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfiguration {
    #[serde(default = "default_models_url")]
    pub models_url: String,

    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    #[serde(default = "default_task_retention")]
    pub task_retention_seconds: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_callback_port() -> u16 {
    1455
}

fn default_callback_path() -> String {
    "/auth/callback".to_string()
}

fn default_auth_url() -> String {
    "https://auth.openai.com/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://auth.openai.com/oauth/token".to_string()
}

fn default_client_id() -> String {
    "app_EMoamEEZ73f0CkXaXp7hrann".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:1455/auth/callback".to_string()
}

fn default_scopes() -> String {
    "openid email profile offline_access".to_string()
}

fn default_session_ttl() -> u64 {
    600
}

fn default_exchange_timeout() -> u64 {
    30
}

fn default_models_url() -> String {
    "https://chatgpt.com/backend-api/models".to_string()
}

fn default_probe_timeout() -> u64 {
    15
}

fn default_batch_concurrency() -> usize {
    5
}

fn default_task_retention() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            accounts_file: None,
        }
    }
}

impl Default for CallbackConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_callback_port(),
            path: default_callback_path(),
        }
    }
}

impl Default for OAuthConfiguration {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            client_id: default_client_id(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            session_ttl_seconds: default_session_ttl(),
            exchange_timeout_seconds: default_exchange_timeout(),
        }
    }
}

impl Default for ProbeConfiguration {
    fn default() -> Self {
        Self {
            models_url: default_models_url(),
            timeout_seconds: default_probe_timeout(),
            batch_concurrency: default_batch_concurrency(),
            task_retention_seconds: default_task_retention(),
            cleanup_interval_seconds: default_cleanup_interval(),
            user_agent: default_user_agent(),
        }
    }
}

impl OAuthConfiguration {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_seconds)
    }
}

impl ProbeConfiguration {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

impl Configuration {
    pub fn new() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(config::File::with_name("config"));
        }

        builder = builder.add_source(config::Environment::with_prefix("CODEX_AUTH").separator("__"));

        builder.build()?.try_deserialize()
    }
}
