//! CLI subcommand implementations.

pub mod ingest;
pub mod online;
pub mod push;
pub mod token;
