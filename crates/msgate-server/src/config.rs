//! Server configuration: TOML file + CLI overrides.

use crate::policy::MultiLoginMode;
use msgate_core::{GateError, GateResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub login: LoginSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// TLS certificate (PEM). TLS is enabled when both cert and key are set.
    pub cert: Option<String>,
    pub key: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ws_port: default_ws_port(),
            rpc_port: default_rpc_port(),
            bind: default_bind(),
            handshake_timeout_secs: default_handshake_timeout(),
            max_connections: default_max_connections(),
            max_message_len: default_max_message_len(),
            cert: None,
            key: None,
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token signing secret shared with the login service.
    pub secret: Option<String>,
}

/// `[login]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginSection {
    #[serde(default)]
    pub policy: MultiLoginMode,
    #[serde(default = "default_kick_err_code")]
    pub kick_err_code: i32,
    #[serde(default = "default_kick_err_msg")]
    pub kick_err_msg: String,
    #[serde(default = "default_kick_write_timeout")]
    pub kick_write_timeout_ms: u64,
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            policy: MultiLoginMode::default(),
            kick_err_code: default_kick_err_code(),
            kick_err_msg: default_kick_err_msg(),
            kick_write_timeout_ms: default_kick_write_timeout(),
        }
    }
}

fn default_ws_port() -> u16 {
    17778
}
fn default_rpc_port() -> u16 {
    10400
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_handshake_timeout() -> u64 {
    10
}
fn default_max_connections() -> usize {
    10_000
}
fn default_max_message_len() -> usize {
    4096 * 1024
}
fn default_kick_err_code() -> i32 {
    702
}
fn default_kick_err_msg() -> String {
    "token invalid".to_string()
}
fn default_kick_write_timeout() -> u64 {
    1000
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub ws_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub max_connections: Option<usize>,
    pub login_policy: Option<MultiLoginMode>,
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub ws_port: u16,
    pub rpc_port: u16,
    pub handshake_timeout: Duration,
    pub max_connections: usize,
    pub max_message_len: usize,
    pub tls: Option<(PathBuf, PathBuf)>,
    pub secret: Vec<u8>,
    pub login_policy: MultiLoginMode,
    pub kick_err_code: i32,
    pub kick_err_msg: String,
    pub kick_write_timeout: Duration,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> GateResult<Self> {
        let file_config = match config_path.map(expand_tilde) {
            Some(expanded) if expanded.exists() => {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| GateError::Config(format!("config parse error: {e}")))?
            }
            Some(expanded) => {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, cli)
    }

    /// Merge a parsed file with CLI overrides.
    pub fn resolve(file: ConfigFile, cli: CliOverrides) -> GateResult<Self> {
        let secret = match file.auth.secret.as_deref() {
            Some(hex_secret) => hex::decode(hex_secret.trim())
                .map_err(|e| GateError::Config(format!("auth.secret is not valid hex: {e}")))?,
            None => {
                warn!("no auth.secret configured, generated a random one; tokens minted elsewhere will not verify");
                msgate_core::generate_secret()
            }
        };

        let cert = cli.cert.or(file.server.cert);
        let key = cli.key.or(file.server.key);
        let tls = match (cert, key) {
            (Some(c), Some(k)) => Some((expand_tilde_str(&c), expand_tilde_str(&k))),
            (None, None) => None,
            _ => {
                return Err(GateError::Config(
                    "TLS needs both a certificate and a key".into(),
                ))
            }
        };

        Ok(Self {
            bind: file.server.bind,
            ws_port: cli.ws_port.unwrap_or(file.server.ws_port),
            rpc_port: cli.rpc_port.unwrap_or(file.server.rpc_port),
            handshake_timeout: Duration::from_secs(file.server.handshake_timeout_secs),
            max_connections: cli.max_connections.unwrap_or(file.server.max_connections),
            max_message_len: file.server.max_message_len,
            tls,
            secret,
            login_policy: cli.login_policy.unwrap_or(file.login.policy),
            kick_err_code: file.login.kick_err_code,
            kick_err_msg: file.login.kick_err_msg,
            kick_write_timeout: Duration::from_millis(file.login.kick_write_timeout_ms),
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
