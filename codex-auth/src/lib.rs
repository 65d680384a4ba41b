// Shared account and probe types
pub mod common;
pub mod config;
mod error;
pub mod oauth;
pub mod probe;
pub mod store;

pub use common::{Account, AccountId, AccountStatus, AccountTestResult, BatchTask, TokenSet};
pub use config::Configuration;
pub use error::AuthError;
pub use oauth::{AuthorizationStart, CodexOAuthService, OAuthClient, OAuthStatus};
pub use probe::{AccountTester, BatchCoordinator};
pub use store::{AccountStore, InMemoryAccountStore};

// Operator HTTP API (public for binary, internal for library)
#[cfg(feature = "server")]
pub mod server;
