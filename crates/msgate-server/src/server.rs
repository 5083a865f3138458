//! Core server: wires the registry, login policy and token verifier into the
//! client-facing gateway and the internal relay listener.

use crate::auth::{MemoryTokenStore, TokenStore, TokenVerifier};
use crate::config::ServerConfig;
use crate::policy::LoginPolicy;
use crate::registry::ConnectionRegistry;
use crate::relay::{RelayService, RpcListener};
use crate::transport::{GatewaySettings, WebSocketGateway};
use msgate_core::{GateError, GateResult};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// The msgate server instance.
pub struct GateServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    gateway: Arc<WebSocketGateway>,
    rpc: Arc<RpcListener>,
}

impl GateServer {
    /// Build the server. Passing a TLS config enables `wss://` on the
    /// client port; the relay port is always plain TCP.
    pub fn new(config: ServerConfig, tls: Option<rustls::ServerConfig>) -> GateResult<Self> {
        let token_store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let verifier = Arc::new(TokenVerifier::new(config.secret.clone(), token_store.clone()));

        let policy = LoginPolicy::new(
            config.login_policy,
            config.kick_err_code,
            config.kick_err_msg.clone(),
            config.kick_write_timeout,
            token_store,
        );
        let registry = Arc::new(ConnectionRegistry::new(policy));

        let settings = GatewaySettings {
            handshake_timeout: config.handshake_timeout,
            max_connections: config.max_connections,
            max_message_len: config.max_message_len,
        };
        let acceptor = tls.map(|cfg| TlsAcceptor::from(Arc::new(cfg)));
        let gateway = Arc::new(WebSocketGateway::new(
            registry.clone(),
            verifier,
            settings,
            acceptor,
        ));

        let relay = Arc::new(RelayService::new(registry.clone()));
        let rpc = Arc::new(RpcListener::new(relay));

        info!(policy = ?config.login_policy, "login policy configured");

        Ok(Self {
            config,
            registry,
            gateway,
            rpc,
        })
    }

    /// Bind both listeners and serve until one of them fails.
    pub async fn run(&self) -> GateResult<()> {
        let ws_addr = format!("{}:{}", self.config.bind, self.config.ws_port);
        let rpc_addr = format!("{}:{}", self.config.bind, self.config.rpc_port);

        let ws_listener = TcpListener::bind(&ws_addr)
            .await
            .map_err(|e| GateError::Transport(format!("cannot bind {ws_addr}: {e}")))?;
        let rpc_listener = TcpListener::bind(&rpc_addr)
            .await
            .map_err(|e| GateError::Transport(format!("cannot bind {rpc_addr}: {e}")))?;

        tokio::select! {
            result = self.gateway.clone().serve(ws_listener) => result,
            result = self.rpc.clone().serve(rpc_listener) => result,
        }
    }

    /// Drop every registered connection and close it.
    pub async fn shutdown(&self) {
        let conns = self.registry.drain().await;
        info!(count = conns.len(), "closing client connections");
        for conn in conns {
            if let Err(e) = conn.close().await {
                warn!(conn_id = conn.id(), error = %e, "close during shutdown failed");
            }
        }
    }
}
