//! msgate-server: real-time delivery tier of a chat backend.
//!
//! Holds authenticated WebSocket connections from client devices, enforces
//! the multi-terminal login policy, and serves push and online-status
//! requests from internal services over a CBOR RPC port.

mod auth;
mod config;
mod connection;
mod handshake;
mod policy;
mod registry;
mod relay;
mod server;
mod transport;

use clap::Parser;
use config::{CliOverrides, ServerConfig};
use policy::MultiLoginMode;
use server::GateServer;
use std::path::PathBuf;
use tracing::{error, info};

/// msgate-server — chat message gateway
#[derive(Parser, Debug)]
#[command(name = "msgate-server", version, about = "Chat message gateway")]
struct Cli {
    /// Client WebSocket port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Internal RPC port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// TLS certificate (PEM)
    #[arg(long)]
    cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long)]
    key: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.msgate/config.toml")]
    config: String,

    /// Maximum concurrent client connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Multi-terminal login policy
    #[arg(long, value_enum)]
    login_policy: Option<MultiLoginMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let overrides = CliOverrides {
        ws_port: cli.ws_port,
        rpc_port: cli.rpc_port,
        cert: cli.cert.clone(),
        key: cli.key.clone(),
        max_connections: cli.max_connections,
        login_policy: cli.login_policy,
    };
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        ws_port = server_config.ws_port,
        rpc_port = server_config.rpc_port,
        "starting msgate-server"
    );

    let tls_config = match &server_config.tls {
        Some((cert, key)) => match load_tls_config(cert, key) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                error!(error = %e, "failed to load TLS config");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let gate_server = match GateServer::new(server_config, tls_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = gate_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    gate_server.shutdown().await;
    info!("msgate-server stopped");
}

/// Load TLS certificate and key from PEM files, returning a rustls ServerConfig.
fn load_tls_config(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> Result<rustls::ServerConfig, Box<dyn std::error::Error>> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| format!("cannot read cert {}: {e}", cert_path.display()))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| format!("cannot read key {}: {e}", key_path.display()))?;

    let certs: Vec<rustls::pki_types::CertificateDer<'static>> =
        rustls_pemfile::certs(&mut &cert_pem[..]).collect::<Result<Vec<_>, _>>()?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])?.ok_or("no private key found in PEM")?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    // WebSocket upgrade rides on HTTP/1.1.
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(tls_config)
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
