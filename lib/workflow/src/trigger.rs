//! Trigger records.
//!
//! When a document is published its trigger is denormalized into a record
//! keyed by event kind, so incoming events find their documents without
//! loading every graph.

use crate::node::NodeId;
use nodeflow_core::DocumentId;
use serde::{Deserialize, Serialize};

/// A published document's entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    /// The event class that starts runs.
    pub event_kind: String,
    /// The executable document to run.
    pub document_id: DocumentId,
    /// The trigger node within the document.
    pub node_id: NodeId,
}

impl TriggerRecord {
    #[must_use]
    pub fn new(event_kind: impl Into<String>, document_id: DocumentId, node_id: NodeId) -> Self {
        Self {
            event_kind: event_kind.into(),
            document_id,
            node_id,
        }
    }

    /// Returns true if an event of `event_kind` starts this trigger.
    #[must_use]
    pub fn matches(&self, event_kind: &str) -> bool {
        self.event_kind == event_kind
    }
}
