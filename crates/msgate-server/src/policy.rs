//! Multi-terminal login policy.
//!
//! Decides, for every new registration, which existing sessions must be
//! evicted, and carries out an eviction: kick frame, token invalidation,
//! close. Invoked by the registry inside its write critical section.

use crate::auth::TokenStore;
use crate::connection::{Connection, FrameKind};
use msgate_core::{encode_envelope, identity_keys_for, Envelope, GateResult, IdentityKey, TokenStatus};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configured multi-device login mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MultiLoginMode {
    /// One session per (user, platform); a new login kicks the old one.
    #[default]
    KickSamePlatform,
    /// One session per user across all platforms.
    SingleTerminal,
    /// Never evict.
    AllowConcurrentWeb,
}

/// Keys whose live connection must be evicted before `incoming` registers.
pub fn eviction_scope(
    mode: MultiLoginMode,
    incoming: &IdentityKey,
    is_live: impl Fn(&IdentityKey) -> bool,
) -> Vec<IdentityKey> {
    match mode {
        MultiLoginMode::KickSamePlatform => {
            if is_live(incoming) {
                vec![incoming.clone()]
            } else {
                Vec::new()
            }
        }
        MultiLoginMode::SingleTerminal => identity_keys_for(&incoming.user_id)
            .into_iter()
            .filter(|k| is_live(k))
            .collect(),
        MultiLoginMode::AllowConcurrentWeb => Vec::new(),
    }
}

/// Policy settings plus the token store evictions write to.
pub struct LoginPolicy {
    pub mode: MultiLoginMode,
    /// Error code carried by the kick frame.
    pub kick_err_code: i32,
    pub kick_err_msg: String,
    /// Upper bound on the kick write and the close handshake of an evicted
    /// connection; both run while the registry is locked.
    pub kick_write_timeout: Duration,
    token_store: Arc<dyn TokenStore>,
}

impl LoginPolicy {
    pub fn new(
        mode: MultiLoginMode,
        kick_err_code: i32,
        kick_err_msg: String,
        kick_write_timeout: Duration,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            mode,
            kick_err_code,
            kick_err_msg,
            kick_write_timeout,
            token_store,
        }
    }

    pub fn evictions(
        &self,
        incoming: &IdentityKey,
        is_live: impl Fn(&IdentityKey) -> bool,
    ) -> Vec<IdentityKey> {
        eviction_scope(self.mode, incoming, is_live)
    }

    /// Evict `old` in favour of a session holding `incoming_token`.
    ///
    /// Failures are logged and never propagate: the new connection registers
    /// regardless.
    pub async fn evict(&self, old: &Connection, incoming_token: &str) {
        let key = old.key();
        info!(
            user_id = %key.user_id,
            platform = %key.platform,
            conn_id = old.id(),
            remote = %old.remote_addr(),
            "kicking existing session"
        );

        self.send_kick(old).await;

        if let Err(e) = self.invalidate_tokens(key, incoming_token) {
            error!(
                user_id = %key.user_id,
                platform = %key.platform,
                error = %e,
                "token store update failed, kicked tokens not recorded"
            );
        }

        match tokio::time::timeout(self.kick_write_timeout, old.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(conn_id = old.id(), error = %e, "close of kicked connection failed"),
            Err(_) => warn!(conn_id = old.id(), "close of kicked connection timed out"),
        }
    }

    async fn send_kick(&self, old: &Connection) {
        let frame = match encode_envelope(&Envelope::kick(self.kick_err_code, &self.kick_err_msg)) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode kick frame");
                return;
            }
        };
        match tokio::time::timeout(
            self.kick_write_timeout,
            old.write_frame(FrameKind::Binary, &frame),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(conn_id = old.id(), error = %e, "kick frame write failed"),
            Err(_) => warn!(conn_id = old.id(), "kick frame write timed out"),
        }
    }

    /// Mark every token of `key` kicked except `keep`.
    fn invalidate_tokens(&self, key: &IdentityKey, keep: &str) -> GateResult<()> {
        let mut map = self
            .token_store
            .get_token_status_map(&key.user_id, key.platform)?;
        if map.is_empty() {
            warn!(user_id = %key.user_id, platform = %key.platform, "no tokens recorded for kicked session");
            return Ok(());
        }
        for (token, status) in map.iter_mut() {
            if token != keep {
                *status = TokenStatus::Kicked;
            }
        }
        self.token_store
            .set_token_status_map(&key.user_id, key.platform, map)
    }
}
