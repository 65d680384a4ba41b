//! PKCE verifier/challenge and opaque state generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const VERIFIER_BYTES: usize = 96;
const STATE_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct PkceCodes {
    pub code_verifier: String,
    pub code_challenge: String,
}

pub fn generate_pkce_codes() -> Result<PkceCodes, AuthError> {
    let code_verifier = random_token::<VERIFIER_BYTES>()?;
    let code_challenge = code_challenge_s256(&code_verifier);

    Ok(PkceCodes {
        code_verifier,
        code_challenge,
    })
}

pub fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate an unguessable state token for correlating the redirect
pub fn generate_state() -> Result<String, AuthError> {
    random_token::<STATE_BYTES>()
}

fn random_token<const N: usize>() -> Result<String, AuthError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
