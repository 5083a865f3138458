//! Identity keys: the (user, platform) pair that addresses one live connection.

use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite key of a user ID and a platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub user_id: String,
    pub platform: Platform,
}

impl IdentityKey {
    pub fn new(user_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.user_id, self.platform)
    }
}

/// Expand a user ID into one key per known platform, in ordinal order.
///
/// Used for fan-out and online probing; every platform is returned whether or
/// not the user is connected there.
pub fn identity_keys_for(user_id: &str) -> Vec<IdentityKey> {
    Platform::ALL
        .iter()
        .map(|&platform| IdentityKey::new(user_id, platform))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_to_every_platform_in_order() {
        let keys = identity_keys_for("u1");
        assert_eq!(keys.len(), Platform::ALL.len());
        assert!(keys.iter().all(|k| k.user_id == "u1"));
        let platforms: Vec<Platform> = keys.iter().map(|k| k.platform).collect();
        assert_eq!(platforms, Platform::ALL.to_vec());
    }

    #[test]
    fn display_matches_legacy_map_key() {
        let key = IdentityKey::new("u1", Platform::Web);
        assert_eq!(key.to_string(), "u1 Web");
    }
}
