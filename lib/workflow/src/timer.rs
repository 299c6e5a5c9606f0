//! Timer service contract.
//!
//! The engine hands a paused run to a [`TimerService`]; the service later
//! calls back into a [`ResumeTarget`] at or after the requested time. It
//! never calls back early, but may call back late or more than once.

use crate::error::{EngineError, TimerError};
use crate::execution::RunStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::RunId;

/// Arranges future resumption of paused runs.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Requests a resume of `run_id` no earlier than `resume_at`.
    async fn schedule_resume(&self, run_id: RunId, resume_at: DateTime<Utc>) -> Result<(), TimerError>;
}

/// The entry points a timer service calls back into.
#[async_trait]
pub trait ResumeTarget: Send + Sync {
    /// Resumes a run whose timer fired, returning its status afterwards.
    async fn resume_run(&self, run_id: RunId) -> Result<RunStatus, EngineError>;

    /// Resumes every run whose timer is due, returning how many were resumed.
    async fn resume_due(&self) -> Result<usize, EngineError>;
}
