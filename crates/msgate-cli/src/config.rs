//! Client configuration at `~/.msgate/cli.toml`.
//!
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection and token settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultConfig {
    /// Address of the gateway's internal RPC port.
    #[serde(default = "default_server")]
    pub server: String,

    /// Hex-encoded token secret shared with the gateway.
    #[serde(default)]
    pub secret: Option<String>,

    /// Lifetime of minted tokens, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            secret: None,
            token_ttl: default_token_ttl(),
        }
    }
}

fn default_server() -> String {
    "127.0.0.1:10400".to_string()
}

fn default_token_ttl() -> u64 {
    7 * 24 * 3600
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Default config location, `~/.msgate/cli.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".msgate")
            .join("cli.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.default.server, "127.0.0.1:10400");
        assert!(cfg.default.secret.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[default]\nsecret = \"abcd\"").unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.default.secret.as_deref(), Some("abcd"));
        assert_eq!(cfg.default.token_ttl, 7 * 24 * 3600);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[default\nserver = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
