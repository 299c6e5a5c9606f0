//! Error types for the workflow crate.
//!
//! Structural errors (`DocumentError`) and engine errors (`EngineError`) are
//! returned synchronously to callers. Failures that happen while a run is
//! executing are never returned as errors: they are recorded on the run.
//! Callers at the edge of the system carry them in a rootcause `Report`.

use crate::node::NodeId;
use nodeflow_core::{DocumentId, RunId};
use std::fmt;

/// Errors from reading, building or storing graph documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The document is structurally invalid (unknown node type, dangling edge, ...).
    Malformed { reason: String },
    /// No document with the given id exists.
    NotFound { document_id: DocumentId },
    /// The document is executable and can no longer be edited.
    Immutable { document_id: DocumentId },
    /// The backing store failed.
    Storage { message: String },
}

impl DocumentError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed document: {reason}"),
            Self::NotFound { document_id } => write!(f, "document not found: {document_id}"),
            Self::Immutable { document_id } => {
                write!(f, "document {document_id} is executable and cannot be edited")
            }
            Self::Storage { message } => write!(f, "document storage failed: {message}"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Errors from the execution context store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No run with the given id exists.
    RunNotFound { run_id: RunId },
    /// A run with the given id was already created.
    RunAlreadyExists { run_id: RunId },
    /// The backing store failed.
    Backend { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::RunAlreadyExists { run_id } => write!(f, "run already exists: {run_id}"),
            Self::Backend { message } => write!(f, "run store failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the timer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The timer service is not accepting new timers.
    Unavailable { reason: String },
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "timer service unavailable: {reason}"),
        }
    }
}

impl std::error::Error for TimerError {}

/// Errors a node handler reports while processing a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A decision condition could not be evaluated.
    ConditionFailed { expression: String, reason: String },
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConditionFailed { expression, reason } => {
                write!(f, "condition '{expression}' could not be evaluated: {reason}")
            }
        }
    }
}

impl std::error::Error for HandlerError {}

/// Errors returned by the engine's public entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Document operation failed.
    Document(DocumentError),
    /// Run store operation failed.
    Store(StoreError),
    /// Timer service rejected a resume request.
    Timer(TimerError),
    /// No executable document has a trigger for this event kind.
    NoMatchingGraph { event_kind: String },
    /// A run points at a node its graph does not contain.
    UnknownNode { run_id: RunId, node_id: NodeId },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(e) => write!(f, "document error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Timer(e) => write!(f, "timer error: {e}"),
            Self::NoMatchingGraph { event_kind } => {
                write!(f, "no published graph is triggered by event '{event_kind}'")
            }
            Self::UnknownNode { run_id, node_id } => {
                write!(f, "run {run_id} references unknown node '{node_id}'")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DocumentError> for EngineError {
    fn from(e: DocumentError) -> Self {
        Self::Document(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<TimerError> for EngineError {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}
