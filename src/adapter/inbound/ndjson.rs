//! Newline-delimited JSON signal source.
//!
//! Each non-empty line is one [`SignalEvent`]. Malformed lines are logged
//! and skipped; the stream ends at EOF or when the pipeline stops.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::SignalEvent;
use crate::error::Result;

/// Counts from one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub accepted: usize,
    pub malformed: usize,
}

/// Forward events from `reader` to `signals` until EOF.
///
/// # Errors
///
/// Returns an error if reading from `reader` fails.
pub async fn forward_signals<R>(reader: R, signals: mpsc::Sender<SignalEvent>) -> Result<ReadSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = ReadSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: SignalEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed signal event");
                summary.malformed += 1;
                continue;
            }
        };
        debug!(agent = %event.agent, source = %event.source_reference_id, "Signal event read");
        if signals.send(event).await.is_err() {
            info!("Signal pipeline closed, input reader stopping");
            break;
        }
        summary.accepted += 1;
    }
    Ok(summary)
}
