//! Token store: per (user, platform) map from session token to status.
//!
//! The store is owned by the external login service; the gateway only reads
//! it during verification and rewrites it when a session is kicked. Callers
//! must tolerate last-write-wins semantics.

use msgate_core::{GateError, GateResult, Platform, TokenStatus};
use std::collections::HashMap;
use std::sync::RwLock;

pub type TokenStatusMap = HashMap<String, TokenStatus>;

/// Access to the shared token status records.
pub trait TokenStore: Send + Sync {
    /// Fetch every token recorded for `(user_id, platform)`. An unknown
    /// identity yields an empty map.
    fn get_token_status_map(&self, user_id: &str, platform: Platform) -> GateResult<TokenStatusMap>;

    /// Replace the token map for `(user_id, platform)`.
    fn set_token_status_map(
        &self,
        user_id: &str,
        platform: Platform,
        map: TokenStatusMap,
    ) -> GateResult<()>;
}

/// In-process token store. Used when no external store is configured.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<(String, Platform), TokenStatusMap>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token_status_map(&self, user_id: &str, platform: Platform) -> GateResult<TokenStatusMap> {
        let records = self
            .records
            .read()
            .map_err(|_| GateError::TokenStore("token store lock poisoned".into()))?;
        Ok(records
            .get(&(user_id.to_string(), platform))
            .cloned()
            .unwrap_or_default())
    }

    fn set_token_status_map(
        &self,
        user_id: &str,
        platform: Platform,
        map: TokenStatusMap,
    ) -> GateResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| GateError::TokenStore("token store lock poisoned".into()))?;
        records.insert((user_id.to_string(), platform), map);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identity_is_empty() {
        let store = MemoryTokenStore::new();
        assert!(store.get_token_status_map("u1", Platform::Web).unwrap().is_empty());
    }

    #[test]
    fn maps_are_scoped_per_platform() {
        let store = MemoryTokenStore::new();
        let mut map = TokenStatusMap::new();
        map.insert("t1".into(), TokenStatus::Valid);
        store.set_token_status_map("u1", Platform::Web, map).unwrap();

        assert_eq!(
            store.get_token_status_map("u1", Platform::Web).unwrap().get("t1"),
            Some(&TokenStatus::Valid)
        );
        assert!(store.get_token_status_map("u1", Platform::Ios).unwrap().is_empty());
    }
}
