//! Newline-delimited JSON event input.
//!
//! Each line is one event: `{ "eventKind": "...", "variables": { ... } }`.
//! Blank lines are ignored; malformed lines are logged and skipped.

use crate::error::DaemonError;
use nodeflow_core::RunId;
use nodeflow_workflow::{Engine, EngineError, Variables};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// An event read from the input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    pub event_kind: String,
    #[serde(default)]
    pub variables: Variables,
}

/// Parses one input line; `Ok(None)` for a blank line.
///
/// # Errors
///
/// Returns the JSON error for a line that is not a valid event.
pub fn parse_event(line: &str) -> Result<Option<IncomingEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Counters for a finished input stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventSummary {
    /// Runs started, in order.
    pub runs: Vec<RunId>,
    /// Events that no published graph listens for.
    pub unmatched: usize,
    /// Lines that were not valid events, or whose dispatch failed.
    pub skipped: usize,
}

/// Dispatches every event read from `input` until end of input.
///
/// # Errors
///
/// Returns an error only if reading from `input` fails.
pub async fn process_events<R>(
    engine: &Engine,
    input: R,
) -> nodeflow_core::Result<EventSummary, DaemonError>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = EventSummary::default();
    let mut lines = input.lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.map_err(|e| DaemonError::Input {
        details: e.to_string(),
    })? {
        line_number += 1;
        let event = match parse_event(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(error) => {
                warn!(line = line_number, %error, "skipping malformed event");
                summary.skipped += 1;
                continue;
            }
        };

        match engine.dispatch_event(&event.event_kind, event.variables).await {
            Ok(runs) => {
                info!(event_kind = %event.event_kind, runs = runs.len(), "event dispatched");
                summary.runs.extend(runs);
            }
            Err(EngineError::NoMatchingGraph { .. }) => {
                debug!(line = line_number, "event matched no graph");
                summary.unmatched += 1;
            }
            Err(error) => {
                warn!(line = line_number, event_kind = %event.event_kind, %error, "event dispatch failed");
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}
