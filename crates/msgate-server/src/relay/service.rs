//! RelayService: resolves push recipients and fans frames out to them.
//!
//! A push is request-scoped, not all-or-nothing: every platform of the
//! target user is probed and written independently, and each outcome is
//! reported as its own result code.

use crate::connection::FrameKind;
use crate::registry::ConnectionRegistry;
use futures_util::future::join_all;
use msgate_core::messages::{
    DeliveryCode, MsgData, OnlineStatusRequest, OnlineStatusResponse, PerRecipientResult,
    PlatformStatus, PushRequest, PushResponse, UserOnlineStatus,
};
use msgate_core::{encode_envelope, identity_keys_for, Envelope, GateResult, IdentityKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relays producer pushes to registered connections.
pub struct RelayService {
    registry: Arc<ConnectionRegistry>,
}

impl RelayService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `req` to every live connection of its addressing target.
    ///
    /// Delivery absence is not an error: a user with no live connection gets
    /// all-`NotOnline` results and the caller falls back to offline push.
    /// Only a failure to encode the envelope fails the call.
    pub async fn push_message(&self, req: &PushRequest) -> GateResult<PushResponse> {
        debug!(operation_id = %req.operation_id, send_id = %req.send_id, recv_id = %req.recv_id, "push arrived");

        let frame = encode_envelope(&Envelope::push(&req.operation_id, &MsgData::from(req))?)?;
        let target = req.addressing_target();

        let attempts = identity_keys_for(target)
            .into_iter()
            .map(|key| self.deliver(req, key, &frame));
        let results = join_all(attempts).await;

        if results.iter().all(|r| r.result_code == DeliveryCode::NotOnline) {
            warn!(
                operation_id = %req.operation_id,
                recv_id = %target,
                "push matched no live connection"
            );
        }

        Ok(PushResponse {
            send_id: req.send_id.clone(),
            results,
        })
    }

    async fn deliver(&self, req: &PushRequest, key: IdentityKey, frame: &[u8]) -> PerRecipientResult {
        let result_code = match self.registry.lookup_by_key(&key).await {
            None => DeliveryCode::NotOnline,
            Some(conn) => match conn.write_frame(FrameKind::Binary, frame).await {
                Ok(()) => {
                    info!(
                        operation_id = %req.operation_id,
                        recv_id = %key.user_id,
                        platform = %key.platform,
                        "pushed to connection"
                    );
                    DeliveryCode::Delivered
                }
                Err(e) => {
                    warn!(
                        operation_id = %req.operation_id,
                        recv_id = %key.user_id,
                        platform = %key.platform,
                        sender_platform = req.platform_id,
                        remote = %conn.remote_addr(),
                        error = %e,
                        "push write failed"
                    );
                    DeliveryCode::WriteFailed
                }
            },
        };

        PerRecipientResult {
            recv_id: key.user_id,
            platform: key.platform,
            result_code,
        }
    }

    /// Per-platform presence for each requested user. Users with no live
    /// connection are omitted; callers treat absence as offline.
    pub async fn get_online_status(&self, req: &OnlineStatusRequest) -> OnlineStatusResponse {
        debug!(operation_id = %req.operation_id, count = req.user_ids.len(), "online status query");

        let mut users = Vec::new();
        for user_id in &req.user_ids {
            let mut platforms = Vec::new();
            for key in identity_keys_for(user_id) {
                if self.registry.lookup_by_key(&key).await.is_some() {
                    platforms.push(PlatformStatus {
                        platform: key.platform,
                        online: true,
                    });
                }
            }
            if !platforms.is_empty() {
                users.push(UserOnlineStatus {
                    user_id: user_id.clone(),
                    is_online: true,
                    platforms,
                });
            }
        }

        OnlineStatusResponse { users }
    }
}
