//! A live client connection: identity, transport write half, write lock.
//!
//! Every outbound byte goes through [`Connection::write_frame`], which holds
//! the connection's own write mutex for the duration of the write. The lock
//! is independent from the registry lock, so a slow peer only delays writers
//! targeting that peer.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use msgate_core::{GateError, GateResult, IdentityKey};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket frame type for an outbound write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Text,
}

/// Write half of a connection's transport.
pub trait FrameSink: Send {
    /// Write one complete frame.
    fn send<'a>(
        &'a mut self,
        kind: FrameKind,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = GateResult<()>> + Send + 'a>>;

    /// Initiate the close handshake and flush.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = GateResult<()>> + Send + '_>>;
}

/// [`FrameSink`] over the write half of a tungstenite stream.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsSink<S> {
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self { sink }
    }
}

impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn send<'a>(
        &'a mut self,
        kind: FrameKind,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = GateResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let msg = match kind {
                FrameKind::Binary => Message::Binary(payload.to_vec().into()),
                FrameKind::Text => {
                    Message::Text(String::from_utf8_lossy(payload).into_owned().into())
                }
            };
            self.sink
                .send(msg)
                .await
                .map_err(|e| GateError::Transport(format!("WS send failed: {e}")))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = GateResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.sink
                .close()
                .await
                .map_err(|e| GateError::Transport(format!("WS close failed: {e}")))
        })
    }
}

/// A registered client connection. Never reused after close.
pub struct Connection {
    id: u64,
    remote_addr: SocketAddr,
    key: IdentityKey,
    token: String,
    writer: Mutex<Box<dyn FrameSink>>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Connection {
    pub fn new(
        remote_addr: SocketAddr,
        key: IdentityKey,
        token: String,
        sink: Box<dyn FrameSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            remote_addr,
            key,
            token,
            writer: Mutex::new(sink),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The identity this connection was registered under.
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// The session token presented at handshake.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write one frame under this connection's write lock.
    pub async fn write_frame(&self, kind: FrameKind, payload: &[u8]) -> GateResult<()> {
        if self.is_closed() {
            return Err(GateError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.send(kind, payload).await
    }

    /// Close the transport. Idempotent; only the first call touches the
    /// socket. Wakes the connection's read loop.
    pub async fn close(&self) -> GateResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.close_signal.notify_one();
        let mut writer = self.writer.lock().await;
        writer.close().await
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
