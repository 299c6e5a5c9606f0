//! Errors that stop the daemon.
//!
//! Problems with individual documents or events are logged and skipped;
//! only failures that leave the daemon unable to run end up here.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum DaemonError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The documents directory could not be read.
    DocumentsDir { path: PathBuf, details: String },
    /// Reading events from the input failed.
    Input { details: String },
    /// The shutdown signal handler could not be installed.
    Signal { details: String },
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::DocumentsDir { path, details } => {
                write!(f, "failed to read documents directory '{}': {details}", path.display())
            }
            Self::Input { details } => write!(f, "failed to read events: {details}"),
            Self::Signal { details } => write!(f, "failed to listen for ctrl-c: {details}"),
        }
    }
}

impl std::error::Error for DaemonError {}
