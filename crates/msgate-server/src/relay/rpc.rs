//! RPC surface of the RelayService.
//!
//! Producers connect over TCP and exchange length-prefixed CBOR frames: one
//! [`RpcRequest`] in, one [`RpcResponse`] out, answered in request order per
//! connection. Each RPC connection runs on its own task; there is no global
//! request queue.

use super::service::RelayService;
use msgate_core::messages::{RpcRequest, RpcResponse};
use msgate_core::{cbor_decode, frame_encode, FrameDecoder, GateResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Accepts producer connections and dispatches their requests.
pub struct RpcListener {
    relay: Arc<RelayService>,
}

impl RpcListener {
    pub fn new(relay: Arc<RelayService>) -> Self {
        Self { relay }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> GateResult<()> {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "relay RPC listening");

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let rpc = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = rpc.handle_connection(stream, remote).await {
                            debug!(remote = %remote, error = %e, "RPC connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "RPC accept failed");
                }
            }
        }
    }

    async fn handle_connection<S>(&self, mut stream: S, remote: SocketAddr) -> GateResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(remote = %remote, "RPC client connected");
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 16 * 1024];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                debug!(remote = %remote, "RPC client disconnected");
                return Ok(());
            }

            for payload in decoder.feed_raw(&buf[..n])? {
                let response = match cbor_decode::<RpcRequest>(&payload) {
                    Ok(request) => self.dispatch(request).await,
                    Err(e) => {
                        warn!(remote = %remote, error = %e, "undecodable RPC request");
                        RpcResponse::Error {
                            message: e.to_string(),
                        }
                    }
                };
                stream.write_all(&frame_encode(&response)?).await?;
            }
        }
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::PushMessage(req) => match self.relay.push_message(&req).await {
                Ok(resp) => RpcResponse::PushMessage(resp),
                Err(e) => {
                    error!(operation_id = %req.operation_id, error = %e, "push failed");
                    RpcResponse::Error {
                        message: e.to_string(),
                    }
                }
            },
            RpcRequest::GetOnlineStatus(req) => {
                RpcResponse::OnlineStatus(self.relay.get_online_status(&req).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::mock_connection;
    use crate::policy::MultiLoginMode;
    use crate::registry::testing::registry;
    use msgate_core::messages::{DeliveryCode, OnlineStatusRequest, PushRequest, SessionType};
    use msgate_core::{IdentityKey, Platform};
    use tokio::net::TcpStream;

    async fn start() -> (SocketAddr, Arc<crate::registry::ConnectionRegistry>) {
        let reg = Arc::new(registry(MultiLoginMode::KickSamePlatform));
        let rpc = Arc::new(RpcListener::new(Arc::new(RelayService::new(reg.clone()))));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(rpc.serve(listener));
        (addr, reg)
    }

    async fn read_response(stream: &mut TcpStream, decoder: &mut FrameDecoder) -> RpcResponse {
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed RPC stream");
            let mut decoded: Vec<RpcResponse> = decoder.feed(&buf[..n]).unwrap();
            if !decoded.is_empty() {
                return decoded.remove(0);
            }
        }
    }

    #[tokio::test]
    async fn push_and_status_over_the_wire() {
        let (addr, reg) = start().await;
        let (conn, log) = mock_connection(IdentityKey::new("bob", Platform::Web), "t");
        reg.register(conn).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let push = RpcRequest::PushMessage(PushRequest {
            operation_id: "op".into(),
            send_id: "alice".into(),
            recv_id: "bob".into(),
            session_type: SessionType::Single,
            msg_from: 0,
            content_type: 101,
            content: "hi".into(),
            client_msg_id: String::new(),
            server_msg_id: String::new(),
            send_time: 0,
            recv_seq: 0,
            sender_nick_name: String::new(),
            sender_face_url: String::new(),
            platform_id: 1,
        });
        stream.write_all(&frame_encode(&push).unwrap()).await.unwrap();
        let RpcResponse::PushMessage(resp) = read_response(&mut stream, &mut decoder).await else {
            panic!("expected push response");
        };
        let web = resp.results.iter().find(|r| r.platform == Platform::Web).unwrap();
        assert_eq!(web.result_code, DeliveryCode::Delivered);
        assert_eq!(log.frames().len(), 1);

        let status = RpcRequest::GetOnlineStatus(OnlineStatusRequest {
            operation_id: "op".into(),
            user_ids: vec!["bob".into(), "nobody".into()],
        });
        stream.write_all(&frame_encode(&status).unwrap()).await.unwrap();
        let RpcResponse::OnlineStatus(resp) = read_response(&mut stream, &mut decoder).await else {
            panic!("expected status response");
        };
        assert_eq!(resp.users.len(), 1);
    }

    #[tokio::test]
    async fn garbage_frame_gets_error_and_stream_survives() {
        let (addr, _) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let mut garbage = 3u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(&[0xff, 0xff, 0xff]);
        stream.write_all(&garbage).await.unwrap();
        assert!(matches!(
            read_response(&mut stream, &mut decoder).await,
            RpcResponse::Error { .. }
        ));

        let status = RpcRequest::GetOnlineStatus(OnlineStatusRequest {
            operation_id: String::new(),
            user_ids: vec!["x".into()],
        });
        stream.write_all(&frame_encode(&status).unwrap()).await.unwrap();
        assert!(matches!(
            read_response(&mut stream, &mut decoder).await,
            RpcResponse::OnlineStatus(_)
        ));
    }
}
