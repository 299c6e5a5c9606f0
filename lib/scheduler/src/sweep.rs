//! Periodic recovery of waiting runs.

use nodeflow_workflow::ResumeTarget;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resumes runs whose timers are due but were never fired, e.g. because the
/// process restarted while they were waiting.
pub struct WaitingRunSweeper {
    target: Arc<dyn ResumeTarget>,
    interval: Duration,
    cancel: CancellationToken,
}

impl WaitingRunSweeper {
    #[must_use]
    pub fn new(target: Arc<dyn ResumeTarget>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            target,
            interval,
            cancel,
        }
    }

    /// Sweeps once per interval, starting immediately, until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "waiting-run sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.target.resume_due().await {
                    Ok(0) => {}
                    Ok(resumed) => debug!(resumed, "sweeper resumed runs"),
                    Err(e) => warn!(error = %e, "sweep failed"),
                },
                () = self.cancel.cancelled() => break,
            }
        }
        info!("waiting-run sweeper stopped");
    }
}
