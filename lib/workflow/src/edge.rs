//! Edge types for workflow graphs.
//!
//! An edge connects an output port of one node to another node. Nodes have
//! no named inputs, so the target is identified by node id alone.

use crate::node::NodeId;
use crate::port::PortId;
use serde::{Deserialize, Serialize};

/// An edge as it appears in a graph document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// The node the edge leaves from.
    pub source_node_id: NodeId,
    /// The output port on the source node. Absent means the implicit `output` port.
    #[serde(default)]
    pub source_port_id: PortId,
    /// The node the edge enters.
    pub target_node_id: NodeId,
}

impl Edge {
    /// Creates an edge leaving a specific port.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, port: PortId, target: impl Into<NodeId>) -> Self {
        Self {
            source_node_id: source.into(),
            source_port_id: port,
            target_node_id: target.into(),
        }
    }

    /// Creates an edge leaving the implicit `output` port.
    #[must_use]
    pub fn output(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self::new(source, PortId::output(), target)
    }

    /// Returns true if the edge starts and ends on the same node.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source_node_id == self.target_node_id
    }
}

/// Edge weight stored in the petgraph representation.
///
/// Endpoints live in the graph structure; the weight keeps the port and the
/// edge's position in the original document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeWeight {
    /// The output port on the source node.
    pub port: PortId,
    /// Position of the edge in the document's edge sequence.
    pub position: usize,
}
