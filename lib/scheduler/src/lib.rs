//! Timers for the nodeflow engine.
//!
//! This crate provides:
//!
//! - **Timer Service**: A tokio-backed `TimerService` and the driver that fires its timers
//! - **Sweeper**: A periodic pass that resumes waiting runs whose timers were lost

pub mod sweep;
pub mod timer;

pub use sweep::WaitingRunSweeper;
pub use timer::{TimerDriver, TimerRequest, TokioTimerService};
