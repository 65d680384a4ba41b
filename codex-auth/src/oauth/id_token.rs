//! Claim extraction from ID/access tokens.
//!
//! Payloads are decoded without signature verification. That is only sound
//! for tokens taken straight from the token endpoint response over TLS.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

const AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// Identity and plan claims of interest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub email: Option<String>,
    pub chatgpt_account_id: Option<String>,
    pub plan: Option<String>,
}

impl TokenClaims {
    pub fn from_token(token: &str) -> Self {
        let Some(claims) = decode_claims(token) else {
            return Self::default();
        };

        Self {
            email: string_claim(claims.get("email")),
            chatgpt_account_id: extract_account_id(&claims),
            plan: extract_plan(&claims),
        }
    }
}

/// Decode the payload segment of a JWT into a JSON object
pub fn decode_claims(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(pad(payload)))
        .ok()?;

    serde_json::from_slice::<Value>(&bytes)
        .ok()
        .filter(Value::is_object)
}

/// Plan names as stored on the account: lowercase, with the team plan alias folded
pub fn normalize_plan(raw: &str) -> Option<String> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "" => None,
        "chatgptteamplan" => Some("team".to_string()),
        _ => Some(value),
    }
}

fn extract_plan(claims: &Value) -> Option<String> {
    if let Some(plan) = string_claim(claims.get("chatgpt_plan_type")).and_then(|p| normalize_plan(&p)) {
        return Some(plan);
    }
    let auth = auth_claim(claims)?;
    string_claim(auth.get("chatgpt_plan_type"))
        .or_else(|| string_claim(auth.get("plan_type")))
        .and_then(|p| normalize_plan(&p))
}

fn extract_account_id(claims: &Value) -> Option<String> {
    auth_claim(claims)
        .and_then(|auth| string_claim(auth.get("chatgpt_account_id")))
        .or_else(|| string_claim(claims.get("chatgpt_account_id")))
}

/// The provider's namespaced claim, either an object or a JSON-encoded string
fn auth_claim(claims: &Value) -> Option<Value> {
    match claims.get(AUTH_CLAIM)? {
        Value::Object(_) => claims.get(AUTH_CLAIM).cloned(),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_object),
        _ => None,
    }
}

fn string_claim(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn pad(segment: &str) -> String {
    let mut padded = segment.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}
