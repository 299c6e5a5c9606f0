//! The graph document: the unit the editor produces and the engine persists.
//!
//! A document is a plain list of nodes and an ordered list of edges. It says
//! nothing about validity; see [`crate::validation`] for that.

use crate::edge::Edge;
use crate::error::DocumentError;
use crate::node::Node;
use serde::{Deserialize, Serialize};

/// A serialized workflow graph as exchanged with the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// The nodes of the graph.
    pub nodes: Vec<Node>,
    /// The edges of the graph, in authoring order.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDocument {
    /// Creates a document from nodes and edges.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Parses a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Malformed` if required fields are absent,
    /// a node type is unknown, or a config does not match its node type.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::malformed(e.to_string()))
    }

    /// Parses a document from JSON bytes.
    ///
    /// # Errors
    ///
    /// Same as [`GraphDocument::from_json`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        serde_json::from_slice(bytes).map_err(|e| DocumentError::malformed(e.to_string()))
    }

    /// Serializes the document to JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Nodes and edges hold only strings, integers and JSON values.
        serde_json::to_string(self).unwrap_or_default()
    }
}
