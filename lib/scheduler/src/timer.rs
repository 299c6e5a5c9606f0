//! Tokio-backed timer service.
//!
//! [`TokioTimerService`] only enqueues requests. [`TimerDriver`] owns the
//! receiving end: for every request it sleeps until the resume time and then
//! calls back into the engine. Timers live in memory; runs whose timers are
//! lost on restart are picked up by the sweeper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::RunId;
use nodeflow_workflow::{Clock, ResumeTarget, SystemClock, TimerError, TimerService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A request to resume a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub run_id: RunId,
    pub resume_at: DateTime<Utc>,
}

/// The sending half of the timer channel, handed to the engine.
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    sender: mpsc::UnboundedSender<TimerRequest>,
}

impl TokioTimerService {
    /// Creates the service and the receiver to hand to a [`TimerDriver`].
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TimerService for TokioTimerService {
    async fn schedule_resume(&self, run_id: RunId, resume_at: DateTime<Utc>) -> Result<(), TimerError> {
        self.sender
            .send(TimerRequest { run_id, resume_at })
            .map_err(|_| TimerError::Unavailable {
                reason: "timer driver has stopped".to_string(),
            })
    }
}

/// Fires timers by calling back into a [`ResumeTarget`].
pub struct TimerDriver {
    requests: mpsc::UnboundedReceiver<TimerRequest>,
    target: Arc<dyn ResumeTarget>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl TimerDriver {
    #[must_use]
    pub fn new(
        requests: mpsc::UnboundedReceiver<TimerRequest>,
        target: Arc<dyn ResumeTarget>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            requests,
            target,
            clock: Arc::new(SystemClock),
            cancel,
        }
    }

    /// Replaces the clock used to compute how long to sleep.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until cancelled or until every service handle is dropped.
    pub async fn run(mut self) {
        info!("timer driver started");
        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        debug!("all timer service handles dropped");
                        break;
                    };
                    self.arm(request);
                }
                () = self.cancel.cancelled() => break,
            }
        }
        info!("timer driver stopped");
    }

    fn arm(&self, request: TimerRequest) {
        let delay = (request.resume_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let target = Arc::clone(&self.target);
        let cancel = self.cancel.clone();

        debug!(run_id = %request.run_id, ?delay, "timer armed");
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = target.resume_run(request.run_id).await {
                        warn!(run_id = %request.run_id, error = %e, "timer resume failed");
                    }
                }
                () = cancel.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_workflow::{EngineError, ManualClock, RunStatus};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingTarget {
        resumed: Mutex<Vec<(RunId, Instant)>>,
    }

    impl RecordingTarget {
        fn resumed(&self) -> Vec<(RunId, Instant)> {
            self.resumed.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ResumeTarget for RecordingTarget {
        async fn resume_run(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
            self.resumed.lock().expect("lock").push((run_id, Instant::now()));
            Ok(RunStatus::Running)
        }

        async fn resume_due(&self) -> Result<usize, EngineError> {
            Ok(0)
        }
    }

    fn driver(
        target: Arc<RecordingTarget>,
        clock: Arc<ManualClock>,
    ) -> (TokioTimerService, CancellationToken, tokio::task::JoinHandle<()>) {
        let (service, requests) = TokioTimerService::new();
        let cancel = CancellationToken::new();
        let driver = TimerDriver::new(requests, target, cancel.clone()).with_clock(clock);
        (service, cancel, tokio::spawn(driver.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_no_earlier_than_resume_time() {
        let target = Arc::new(RecordingTarget::default());
        let clock = Arc::new(ManualClock::default());
        let (service, cancel, handle) = driver(target.clone(), clock.clone());

        let run_id = RunId::new();
        let armed_at = Instant::now();
        service
            .schedule_resume(run_id, clock.now() + chrono::Duration::seconds(5))
            .await
            .expect("schedule");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(target.resumed().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let resumed = target.resumed();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].0, run_id);
        assert!(resumed[0].1 - armed_at >= Duration::from_secs(5));

        cancel.cancel();
        handle.await.expect("driver task");
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_timer_fires_immediately() {
        let target = Arc::new(RecordingTarget::default());
        let clock = Arc::new(ManualClock::default());
        let (service, cancel, handle) = driver(target.clone(), clock.clone());

        service
            .schedule_resume(RunId::new(), clock.now() - chrono::Duration::seconds(30))
            .await
            .expect("schedule");
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(target.resumed().len(), 1);
        cancel.cancel();
        handle.await.expect("driver task");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_driver_drops_pending_timers() {
        let target = Arc::new(RecordingTarget::default());
        let clock = Arc::new(ManualClock::default());
        let (service, cancel, handle) = driver(target.clone(), clock.clone());

        service
            .schedule_resume(RunId::new(), clock.now() + chrono::Duration::seconds(5))
            .await
            .expect("schedule");
        tokio::task::yield_now().await;

        cancel.cancel();
        handle.await.expect("driver task");
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(target.resumed().is_empty());
        assert!(matches!(
            service.schedule_resume(RunId::new(), clock.now()).await,
            Err(TimerError::Unavailable { .. })
        ));
    }
}
