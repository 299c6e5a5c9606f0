//! Core domain types and utilities for nodeflow.
//!
//! This crate provides the identifiers and error handling shared by the
//! workflow engine, the scheduler and the daemon.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DocumentId, ParseIdError, RunId};
