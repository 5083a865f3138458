//! Client for the gateway's RelayService RPC port.
//!
//! Requests and responses are length-prefixed CBOR frames; the server answers
//! each request in order on the same stream.

use anyhow::{bail, Context, Result};
use msgate_core::messages::{
    OnlineStatusRequest, OnlineStatusResponse, PushRequest, PushResponse, RpcRequest, RpcResponse,
};
use msgate_core::{frame_encode, FrameDecoder};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub struct RelayClient {
    stream: TcpStream,
    decoder: FrameDecoder,
    ready: VecDeque<RpcResponse>,
}

impl RelayClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to relay at {addr}"))?;
        debug!(addr = %addr, "connected to relay");
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
        })
    }

    pub async fn push_message(&mut self, req: PushRequest) -> Result<PushResponse> {
        match self.call(RpcRequest::PushMessage(req)).await? {
            RpcResponse::PushMessage(resp) => Ok(resp),
            RpcResponse::Error { message } => bail!("relay error: {message}"),
            other => bail!("unexpected response: {other:?}"),
        }
    }

    pub async fn get_online_status(&mut self, user_ids: Vec<String>) -> Result<OnlineStatusResponse> {
        let req = OnlineStatusRequest {
            operation_id: String::new(),
            user_ids,
        };
        match self.call(RpcRequest::GetOnlineStatus(req)).await? {
            RpcResponse::OnlineStatus(resp) => Ok(resp),
            RpcResponse::Error { message } => bail!("relay error: {message}"),
            other => bail!("unexpected response: {other:?}"),
        }
    }

    async fn call(&mut self, req: RpcRequest) -> Result<RpcResponse> {
        let frame = frame_encode(&req)?;
        self.stream.write_all(&frame).await?;

        let mut buf = vec![0u8; 16 * 1024];
        loop {
            if let Some(resp) = self.ready.pop_front() {
                return Ok(resp);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                bail!("relay closed the connection");
            }
            let decoded: Vec<RpcResponse> = self.decoder.feed(&buf[..n])?;
            self.ready.extend(decoded);
        }
    }
}
