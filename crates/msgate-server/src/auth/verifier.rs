//! Handshake token verification.

use super::store::TokenStore;
use msgate_core::{verify_token, GateError, GateResult, Platform, TokenStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Checks a handshake token's signature and its session status.
pub struct TokenVerifier {
    secret: Vec<u8>,
    store: Arc<dyn TokenStore>,
}

impl TokenVerifier {
    pub fn new(secret: Vec<u8>, store: Arc<dyn TokenStore>) -> Self {
        Self { secret, store }
    }

    /// Verify `token` for `(user_id, platform)`.
    ///
    /// Rejects bad signatures, expired tokens, and tokens the store has
    /// marked kicked. A correctly signed token the store has never seen is
    /// recorded as valid. A store that cannot be read rejects the handshake.
    pub fn verify(&self, token: &str, user_id: &str, platform: Platform) -> GateResult<()> {
        verify_token(&self.secret, user_id, platform, token)?;

        let mut map = self.store.get_token_status_map(user_id, platform)?;
        match map.get(token) {
            Some(TokenStatus::Kicked) => Err(GateError::AuthFailed("token has been kicked".into())),
            Some(TokenStatus::Valid) => Ok(()),
            None => {
                map.insert(token.to_string(), TokenStatus::Valid);
                if let Err(e) = self.store.set_token_status_map(user_id, platform, map) {
                    warn!(user_id = %user_id, platform = %platform, error = %e, "could not record token");
                } else {
                    debug!(user_id = %user_id, platform = %platform, "recorded first use of token");
                }
                Ok(())
            }
        }
    }

    /// The token store backing this verifier.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }
}
