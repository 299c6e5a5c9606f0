//! Workflow graph model and execution engine for nodeflow.
//!
//! This crate provides:
//!
//! - **Graph Model**: Directed graphs using petgraph with Trigger, Delay, Decision and Business nodes
//! - **Validator**: Trigger count, port arity, reachability, cycle and self-loop checks
//! - **Handlers**: One pure handler per node type
//! - **Execution**: Run state, the run store and the engine that steps runs
//! - **Actions**: The contract for external business actions, with retries
//! - **Timers**: The contract for resuming runs parked at delay nodes

pub mod action;
pub mod clock;
pub mod definition;
pub mod document;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expression;
pub mod graph;
pub mod handler;
pub mod lease;
pub mod node;
pub mod port;
pub mod store;
pub mod timer;
pub mod trigger;
pub mod validation;

pub use action::{ActionInvoker, ActionOutcome, ActionRegistry, ActionRequest, BusinessAction, RetryPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use definition::{DocumentMetadata, DocumentStatus, DocumentStore, InMemoryDocumentStore, StoredDocument};
pub use document::GraphDocument;
pub use edge::Edge;
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use error::{DocumentError, EngineError, HandlerError, StoreError, TimerError};
pub use execution::{HistoryEntry, NodeOutcome, Run, RunStatus, Variables};
pub use graph::WorkflowGraph;
pub use node::{Node, NodeConfig, NodeId, NodeType};
pub use port::PortId;
pub use store::{InMemoryRunStore, RunStore};
pub use timer::{ResumeTarget, TimerService};
pub use trigger::TriggerRecord;
pub use validation::{ValidationError, ValidationResult, validate, validate_document};
