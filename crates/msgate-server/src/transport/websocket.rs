//! WebSocket gateway using tokio-tungstenite.
//!
//! Accepts TCP (optionally TLS) connections, authenticates the upgrade
//! request, registers the resulting connection, and then runs that
//! connection's read loop on the accepting task. One task per connection; a
//! slow or dead peer only stalls its own task.

use crate::auth::TokenVerifier;
use crate::connection::{Connection, FrameKind, WsSink};
use crate::handshake::{self, HandshakeParams, Rejection};
use crate::registry::ConnectionRegistry;
use futures_util::{Stream, StreamExt};
use msgate_core::{decode_envelope, encode_envelope, Envelope, GateError, GateResult, IdentityKey};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

/// Limits applied to inbound connections.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Bound on TLS accept plus the HTTP upgrade.
    pub handshake_timeout: Duration,
    /// Upgrades beyond this many registered connections are refused.
    pub max_connections: usize,
    /// Largest inbound message accepted on a connection.
    pub max_message_len: usize,
}

/// The client-facing WebSocket server.
pub struct WebSocketGateway {
    registry: Arc<ConnectionRegistry>,
    verifier: Arc<TokenVerifier>,
    settings: GatewaySettings,
    tls: Option<TlsAcceptor>,
}

impl WebSocketGateway {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        verifier: Arc<TokenVerifier>,
        settings: GatewaySettings,
        tls: Option<TlsAcceptor>,
    ) -> Self {
        Self {
            registry,
            verifier,
            settings,
            tls,
        }
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> GateResult<()> {
        let addr = listener.local_addr()?;
        info!(addr = %addr, tls = self.tls.is_some(), "WebSocket gateway listening");

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = gateway.handle_tcp(stream, remote).await {
                            debug!(remote = %remote, error = %e, "connection not established");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    }

    async fn handle_tcp(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) -> GateResult<()> {
        match self.tls.clone() {
            Some(acceptor) => {
                let tls_stream =
                    tokio::time::timeout(self.settings.handshake_timeout, acceptor.accept(stream))
                        .await
                        .map_err(|_| GateError::Timeout)?
                        .map_err(|e| GateError::Transport(format!("TLS accept failed: {e}")))?;
                self.accept_connection(tls_stream, remote).await
            }
            None => self.accept_connection(stream, remote).await,
        }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.settings.max_message_len);
        config.max_frame_size = Some(self.settings.max_message_len);
        config
    }

    /// Authenticate and upgrade one connection, register it, and serve its
    /// read loop until it ends.
    ///
    /// A rejected or timed-out handshake never produces a [`Connection`].
    pub async fn accept_connection<S>(self: Arc<Self>, stream: S, remote: SocketAddr) -> GateResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut admitted: Option<HandshakeParams> = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if self.registry.online_count() >= self.settings.max_connections {
                warn!(remote = %remote, "rejected upgrade: connection limit reached");
                return Err(Rejection::Overloaded.into_response());
            }
            match handshake::authenticate(req.uri().query(), &self.verifier) {
                Ok(params) => {
                    admitted = Some(params);
                    Ok(resp)
                }
                Err(rejection) => Err(rejection.into_response()),
            }
        };

        let upgrade = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            callback,
            Some(self.ws_config()),
        );
        let ws_stream = match tokio::time::timeout(self.settings.handshake_timeout, upgrade).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(GateError::Transport(format!("WebSocket handshake failed: {e}")));
            }
            Err(_) => {
                warn!(remote = %remote, "WebSocket handshake timed out");
                return Err(GateError::Timeout);
            }
        };
        let Some(params) = admitted else {
            return Err(GateError::AuthFailed("upgrade completed without credentials".into()));
        };

        let (sink, stream) = ws_stream.split();
        let key = IdentityKey::new(params.user_id, params.platform);
        let conn = Connection::new(remote, key, params.token, Box::new(WsSink::new(sink)));

        self.registry.register(conn.clone()).await;
        read_loop(self.registry.clone(), conn, stream).await;
        Ok(())
    }
}

/// Receive frames until the peer goes away or the connection is closed
/// locally, then unregister and close. Never retries.
pub async fn read_loop<St>(registry: Arc<ConnectionRegistry>, conn: Arc<Connection>, mut stream: St)
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = conn.closed() => {
                debug!(conn_id = conn.id(), "connection closed locally");
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Binary(data))) => handle_inbound(&conn, &data).await,
                Some(Ok(Message::Ping(_))) => {
                    debug!(conn_id = conn.id(), user_id = %conn.key().user_id, "ping received");
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id = conn.id(), "peer closed connection");
                    break;
                }
                Some(Ok(_)) => {
                    // Text and pong frames carry nothing at this layer.
                }
                Some(Err(e)) => {
                    warn!(
                        conn_id = conn.id(),
                        user_id = %conn.key().user_id,
                        platform = %conn.key().platform,
                        remote = %conn.remote_addr(),
                        error = %e,
                        "read failed"
                    );
                    break;
                }
            }
        }
    }

    registry.unregister(&conn).await;
    if let Err(e) = conn.close().await {
        debug!(conn_id = conn.id(), error = %e, "close failed");
    }
}

/// Inbound requests (seq sync, pulls, sends) are served by other tiers; here
/// they are only decoded and logged. Undecodable frames get a data-error
/// reply.
async fn handle_inbound(conn: &Connection, data: &[u8]) {
    match decode_envelope(data) {
        Ok(envelope) => {
            debug!(
                conn_id = conn.id(),
                req_identifier = ?envelope.req_identifier,
                operation_id = %envelope.operation_id,
                "inbound request"
            );
        }
        Err(e) => {
            warn!(conn_id = conn.id(), error = %e, "undecodable inbound frame");
            let reply = Envelope::data_error(e.to_string());
            match encode_envelope(&reply) {
                Ok(frame) => {
                    if let Err(e) = conn.write_frame(FrameKind::Binary, &frame).await {
                        debug!(conn_id = conn.id(), error = %e, "data-error reply failed");
                    }
                }
                Err(e) => debug!(conn_id = conn.id(), error = %e, "cannot encode data-error reply"),
            }
        }
    }
}
