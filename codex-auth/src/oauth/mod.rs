mod callback_url;
mod id_token;
mod listener;
mod models;
mod pkce;
mod service;
mod session_store;
mod token_client;

pub use callback_url::{parse_callback_url, CallbackParams};
pub use id_token::{decode_claims, normalize_plan, TokenClaims};
pub use models::{ExchangeClaim, OAuthSession, OAuthStatus, OAuthStatusKind, SessionStatus};
pub use pkce::{code_challenge_s256, generate_pkce_codes, generate_state, PkceCodes};
pub use service::{AuthorizationStart, CodexOAuthService};
pub use session_store::{run_session_sweeper, SessionStore};
pub use token_client::OAuthClient;
