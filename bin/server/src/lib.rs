//! The nodeflow daemon.
//!
//! Wires the engine to in-memory stores, the tokio timer service and the
//! waiting-run sweeper, publishes the graph documents found on disk, then
//! dispatches events read from stdin until end of input or ctrl-c.

pub mod actions;
pub mod config;
pub mod documents;
pub mod error;
pub mod events;

use crate::actions::LoggingAction;
use crate::config::ServerConfig;
use crate::error::DaemonError;
use nodeflow_scheduler::{TimerDriver, TimerRequest, TokioTimerService, WaitingRunSweeper};
use nodeflow_workflow::{
    ActionRegistry, Engine, EngineConfig, InMemoryDocumentStore, InMemoryRunStore, ResumeTarget,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builds an engine over in-memory stores, with every action kind handled
/// by [`LoggingAction`]. Timer requests arrive on the returned receiver.
#[must_use]
pub fn build_engine(config: EngineConfig) -> (Engine, UnboundedReceiver<TimerRequest>) {
    let (timer, requests) = TokioTimerService::new();
    let actions = ActionRegistry::new().with_fallback(Arc::new(LoggingAction));
    let engine = Engine::builder(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(InMemoryRunStore::new()),
        Arc::new(actions),
        Arc::new(timer),
    )
    .config(config)
    .build();
    (engine, requests)
}

/// Runs the daemon until stdin closes or ctrl-c is received.
///
/// # Errors
///
/// Returns an error if the documents directory cannot be read, reading
/// stdin fails, or the signal handler cannot be installed.
pub async fn run(config: ServerConfig) -> nodeflow_core::Result<(), DaemonError> {
    let (engine, requests) = build_engine(config.engine.clone());
    let cancel = CancellationToken::new();

    let target: Arc<dyn ResumeTarget> = Arc::new(engine.clone());
    let driver = tokio::spawn(TimerDriver::new(requests, Arc::clone(&target), cancel.clone()).run());
    let sweeper = tokio::spawn(
        WaitingRunSweeper::new(target, config.sweep_interval(), cancel.clone()).run(),
    );

    let outcome = serve(&engine, &config).await;

    cancel.cancel();
    for (name, task) in [("timer driver", driver), ("sweeper", sweeper)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
    info!("nodeflow stopped");
    outcome
}

async fn serve(engine: &Engine, config: &ServerConfig) -> nodeflow_core::Result<(), DaemonError> {
    let report = documents::load_documents(engine, &config.documents_dir).await?;
    info!(
        published = report.published.len(),
        rejected = report.rejected.len(),
        unreadable = report.unreadable.len(),
        "documents loaded"
    );

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        summary = events::process_events(engine, input) => {
            let summary = summary?;
            info!(
                runs = summary.runs.len(),
                unmatched = summary.unmatched,
                skipped = summary.skipped,
                "end of input"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| DaemonError::Signal { details: e.to_string() })?;
            info!("interrupted");
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_engine() -> (Engine, UnboundedReceiver<TimerRequest>) {
        build_engine(EngineConfig::default())
    }
}
