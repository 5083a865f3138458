//! `msgate token` — mint a session token for testing clients.

use anyhow::{Context, Result};
use msgate_core::{create_token, Platform};

pub fn mint(secret_hex: &str, user_id: &str, platform: &str, ttl_secs: u64) -> Result<String> {
    let secret = hex::decode(secret_hex.trim()).context("secret is not valid hex")?;
    let platform = Platform::parse(platform)?;
    Ok(create_token(&secret, user_id, platform, ttl_secs))
}

pub fn run(secret_hex: Option<&str>, user_id: &str, platform: &str, ttl_secs: u64) -> Result<()> {
    let secret_hex = secret_hex
        .context("no secret given; pass --secret or set default.secret in the config")?;
    println!("{}", mint(secret_hex, user_id, platform, ttl_secs)?);
    Ok(())
}
