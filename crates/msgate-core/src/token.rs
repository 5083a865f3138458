//! HMAC session tokens for msgate.
//!
//! A token binds a (user, platform) identity to an expiry and is signed with
//! a server secret. It travels hex-encoded in the handshake query string.
//! Format: `hex([8-byte expiry][32-byte HMAC-SHA256])`

use crate::error::{GateError, GateResult};
use crate::platform::Platform;
use rand::RngCore;
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Decoded token length in bytes.
pub const TOKEN_LEN: usize = 40;

/// Session status recorded per token in the token store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Valid,
    Kicked,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn signed_data(expiry: u64, user_id: &str, platform: Platform) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + user_id.len() + 5);
    data.extend_from_slice(&expiry.to_be_bytes());
    data.extend_from_slice(user_id.as_bytes());
    data.push(0);
    data.extend_from_slice(&platform.id().to_be_bytes());
    data
}

/// Create a hex-encoded session token valid for `ttl_secs`.
pub fn create_token(secret: &[u8], user_id: &str, platform: Platform, ttl_secs: u64) -> String {
    let expiry = now_secs().saturating_add(ttl_secs);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, &signed_data(expiry, user_id, platform));

    let mut token = Vec::with_capacity(TOKEN_LEN);
    token.extend_from_slice(&expiry.to_be_bytes());
    token.extend_from_slice(tag.as_ref());
    hex::encode(token)
}

/// Verify a hex-encoded session token's signature and expiry.
///
/// Session status (kicked or not) lives in the token store and is checked by
/// the server's verifier, not here.
pub fn verify_token(
    secret: &[u8],
    user_id: &str,
    platform: Platform,
    token: &str,
) -> GateResult<()> {
    let raw = hex::decode(token).map_err(|_| GateError::Token("token is not hex".into()))?;
    if raw.len() != TOKEN_LEN {
        return Err(GateError::Token(format!(
            "invalid token length: expected {TOKEN_LEN}, got {}",
            raw.len()
        )));
    }

    let mut expiry_bytes = [0u8; 8];
    expiry_bytes.copy_from_slice(&raw[..8]);
    let expiry = u64::from_be_bytes(expiry_bytes);

    if now_secs() > expiry {
        return Err(GateError::Token("token expired".into()));
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, &signed_data(expiry, user_id, platform), &raw[8..])
        .map_err(|_| GateError::Token("invalid token signature".into()))
}

/// Generate a random server secret (32 bytes).
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_verify() {
        let secret = generate_secret();
        let token = create_token(&secret, "u1", Platform::Web, 3600);
        assert_eq!(token.len(), TOKEN_LEN * 2);
        assert!(verify_token(&secret, "u1", Platform::Web, &token).is_ok());
    }

    #[test]
    fn bound_to_user_and_platform() {
        let secret = generate_secret();
        let token = create_token(&secret, "u1", Platform::Web, 3600);
        assert!(verify_token(&secret, "u2", Platform::Web, &token).is_err());
        assert!(verify_token(&secret, "u1", Platform::Ios, &token).is_err());
    }

    #[test]
    fn wrong_secret() {
        let token = create_token(&generate_secret(), "u1", Platform::Web, 3600);
        assert!(verify_token(&generate_secret(), "u1", Platform::Web, &token).is_err());
    }

    #[test]
    fn expired_token() {
        let secret = generate_secret();
        let expiry = now_secs() - 10;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
        let tag = hmac::sign(&key, &signed_data(expiry, "u1", Platform::Web));
        let mut raw = expiry.to_be_bytes().to_vec();
        raw.extend_from_slice(tag.as_ref());

        let err = verify_token(&secret, "u1", Platform::Web, &hex::encode(raw)).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let secret = generate_secret();
        let token = create_token(&secret, "u1", Platform::Web, u64::MAX);
        let raw = hex::decode(&token).unwrap();
        assert_eq!(&raw[..8], &u64::MAX.to_be_bytes());
        assert!(verify_token(&secret, "u1", Platform::Web, &token).is_ok());
    }

    #[test]
    fn malformed_tokens() {
        let secret = generate_secret();
        assert!(verify_token(&secret, "u1", Platform::Web, "zz").is_err());
        assert!(verify_token(&secret, "u1", Platform::Web, &hex::encode([0u8; 10])).is_err());
    }
}
