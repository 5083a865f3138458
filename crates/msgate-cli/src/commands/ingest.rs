//! `msgate ingest` — feed queued chat events into the relay.
//!
//! Reads one JSON event per line. A line that does not translate into a push
//! request is dropped with a warning and never retried; a relay failure
//! aborts the run.

use crate::client::RelayClient;
use anyhow::{Context, Result};
use msgate_core::ingest::translate_event;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub pushed: usize,
    pub delivered: usize,
    pub dropped: usize,
}

pub async fn run(server: &str, input: Option<&Path>) -> Result<()> {
    let mut client = RelayClient::connect(server).await?;
    let stats = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            ingest_lines(BufReader::new(file), &mut client).await?
        }
        None => ingest_lines(BufReader::new(tokio::io::stdin()), &mut client).await?,
    };

    info!(
        pushed = stats.pushed,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "ingest finished"
    );
    Ok(())
}

pub async fn ingest_lines<R>(mut reader: R, client: &mut RelayClient) -> Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IngestStats::default();
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        line_no += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let req = match translate_event(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!(line = line_no, error = %e, "dropping malformed event");
                stats.dropped += 1;
                continue;
            }
        };

        let resp = client.push_message(req).await?;
        stats.pushed += 1;
        if resp.delivered_anywhere() {
            stats.delivered += 1;
        }
        debug!(line = line_no, send_id = %resp.send_id, results = resp.results.len(), "event pushed");
    }

    Ok(stats)
}
