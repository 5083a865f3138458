//! msgate — command-line client for the msgate delivery tier.
//!
//! Talks to the gateway's internal RPC port to push messages and query
//! online status, mints session tokens for test clients, and replays queued
//! chat events from a file or stdin.

mod client;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

/// msgate — chat gateway client
#[derive(Parser)]
#[command(name = "msgate", version, about = "Chat gateway client: push, online status, tokens, ingest")]
struct Cli {
    /// Relay RPC address (host:port)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push one message to a recipient's connected devices
    Push {
        /// Sender user ID
        #[arg(long = "from")]
        send_id: String,
        /// Recipient user ID (or group descriptor with --group)
        #[arg(long = "to")]
        recv_id: String,
        /// Message content
        content: String,
        /// Treat the recipient as a group session
        #[arg(long)]
        group: bool,
        /// Content type code
        #[arg(long, default_value_t = 101)]
        content_type: i32,
    },

    /// Show on which platforms users are online
    Online {
        /// User IDs to query
        #[arg(required = true)]
        user_ids: Vec<String>,
    },

    /// Mint a session token
    Token {
        /// User ID
        user_id: String,
        /// Platform name or number (e.g. web, 5)
        platform: String,
        /// Hex-encoded signing secret (overrides config)
        #[arg(long)]
        secret: Option<String>,
        /// Token lifetime in seconds (overrides config)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Push newline-delimited JSON chat events from a file or stdin
    Ingest {
        /// Input file (stdin when omitted)
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("msgate=debug,msgate_cli=debug,msgate_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("msgate=info,msgate_cli=info")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.clone().unwrap_or_else(config::Config::default_path);
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };
    let server = cli.server.clone().unwrap_or(cfg.default.server.clone());

    let result = match cli.command {
        Command::Push {
            send_id,
            recv_id,
            content,
            group,
            content_type,
        } => {
            let args = commands::push::PushArgs {
                send_id,
                recv_id,
                content,
                group,
                content_type,
            };
            commands::push::run(&server, args).await
        }
        Command::Online { user_ids } => commands::online::run(&server, user_ids).await,
        Command::Token {
            user_id,
            platform,
            secret,
            ttl,
        } => {
            let secret = secret.or(cfg.default.secret.clone());
            let ttl = ttl.unwrap_or(cfg.default.token_ttl);
            commands::token::run(secret.as_deref(), &user_id, &platform, ttl)
        }
        Command::Ingest { input } => commands::ingest::run(&server, input.as_deref()).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}
