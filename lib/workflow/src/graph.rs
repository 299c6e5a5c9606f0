//! Workflow graph implementation using petgraph.
//!
//! A `WorkflowGraph` is the in-memory form of a [`GraphDocument`]:
//! - Nodes are workflow steps keyed by their document id
//! - Edges leave a named output port and enter a node
//!
//! Building a graph only checks shape (unique ids, edges between known nodes).
//! Well-formedness rules live in the validator.

use crate::document::GraphDocument;
use crate::edge::{Edge, EdgeWeight};
use crate::error::DocumentError;
use crate::node::{Node, NodeId};
use crate::port::PortId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    graph: DiGraph<Node, EdgeWeight>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

/// A borrowed view of one edge of the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge<'a> {
    /// The node the edge leaves.
    pub source: &'a Node,
    /// The port the edge leaves from.
    pub port: &'a PortId,
    /// The node the edge enters.
    pub target: &'a Node,
    /// Position of the edge in the document.
    pub position: usize,
}

impl GraphEdge<'_> {
    /// Returns true if the edge starts and ends on the same node.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source.id == self.target.id
    }
}

impl WorkflowGraph {
    /// Builds a graph from a document.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Malformed` if two nodes share an id or an edge
    /// references a node that does not exist.
    pub fn from_document(document: &GraphDocument) -> Result<Self, DocumentError> {
        let mut graph = DiGraph::with_capacity(document.nodes.len(), document.edges.len());
        let mut node_index_map = HashMap::with_capacity(document.nodes.len());

        for node in &document.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(DocumentError::malformed(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            let index = graph.add_node(node.clone());
            node_index_map.insert(node.id.clone(), index);
        }

        for (position, edge) in document.edges.iter().enumerate() {
            let lookup = |id: &NodeId| {
                node_index_map.get(id).copied().ok_or_else(|| {
                    DocumentError::malformed(format!(
                        "edge {position} references unknown node '{id}'"
                    ))
                })
            };
            let source = lookup(&edge.source_node_id)?;
            let target = lookup(&edge.target_node_id)?;
            graph.add_edge(
                source,
                target,
                EdgeWeight {
                    port: edge.source_port_id.clone(),
                    position,
                },
            );
        }

        Ok(Self {
            graph,
            node_index_map,
        })
    }

    /// Parses and builds a graph from JSON.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Malformed` for any parse or shape failure.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Self::from_document(&GraphDocument::from_json(json)?)
    }

    /// Converts the graph back into its document form.
    #[must_use]
    pub fn to_document(&self) -> GraphDocument {
        let nodes = self.graph.node_weights().cloned().collect();
        let edges = self
            .edges()
            .into_iter()
            .map(|edge| Edge::new(edge.source.id.clone(), edge.port.clone(), edge.target.id.clone()))
            .collect();
        GraphDocument::new(nodes, edges)
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn node_by_id(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns all nodes in the graph, in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns every trigger node.
    #[must_use]
    pub fn triggers(&self) -> Vec<&Node> {
        self.nodes().filter(|node| node.is_trigger()).collect()
    }

    /// Returns the entry point, if the graph has exactly one trigger.
    #[must_use]
    pub fn trigger_node(&self) -> Option<&Node> {
        match self.triggers().as_slice() {
            [trigger] => Some(trigger),
            _ => None,
        }
    }

    /// Returns every edge in document order.
    #[must_use]
    pub fn edges(&self) -> Vec<GraphEdge<'_>> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .filter_map(|edge| self.view(edge.source(), edge.target(), edge.weight()))
            .collect();
        edges.sort_by_key(|edge| edge.position);
        edges
    }

    /// Returns the edges leaving a node, optionally restricted to one port.
    #[must_use]
    pub fn outgoing_edges(&self, node_id: &NodeId, port: Option<&PortId>) -> Vec<GraphEdge<'_>> {
        let mut edges: Vec<_> = self
            .directed(node_id, Direction::Outgoing)
            .into_iter()
            .filter(|edge| port.is_none_or(|port| edge.port == port))
            .collect();
        edges.sort_by_key(|edge| edge.position);
        edges
    }

    /// Returns the edges entering a node.
    #[must_use]
    pub fn incoming_edges(&self, node_id: &NodeId) -> Vec<GraphEdge<'_>> {
        let mut edges = self.directed(node_id, Direction::Incoming);
        edges.sort_by_key(|edge| edge.position);
        edges
    }

    /// Returns the node reached by leaving `node_id` through `port`.
    ///
    /// `None` means the port is unattached and the flow ends there.
    #[must_use]
    pub fn successor(&self, node_id: &NodeId, port: &PortId) -> Option<&Node> {
        self.outgoing_edges(node_id, Some(port))
            .first()
            .map(|edge| edge.target)
    }

    /// Returns the underlying petgraph graph for traversal algorithms.
    pub(crate) fn inner(&self) -> &DiGraph<Node, EdgeWeight> {
        &self.graph
    }

    /// Returns the petgraph index of a node.
    pub(crate) fn index_of(&self, node_id: &NodeId) -> Option<NodeIndex> {
        self.node_index_map.get(node_id).copied()
    }

    fn directed(&self, node_id: &NodeId, direction: Direction) -> Vec<GraphEdge<'_>> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, direction)
            .filter_map(|edge| self.view(edge.source(), edge.target(), edge.weight()))
            .collect()
    }

    fn view<'a>(
        &'a self,
        source: NodeIndex,
        target: NodeIndex,
        weight: &'a EdgeWeight,
    ) -> Option<GraphEdge<'a>> {
        Some(GraphEdge {
            source: self.graph.node_weight(source)?,
            port: &weight.port,
            target: self.graph.node_weight(target)?,
            position: weight.position,
        })
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }
}

impl TryFrom<GraphDocument> for WorkflowGraph {
    type Error = DocumentError;

    fn try_from(document: GraphDocument) -> Result<Self, Self::Error> {
        Self::from_document(&document)
    }
}

impl From<WorkflowGraph> for GraphDocument {
    fn from(graph: WorkflowGraph) -> Self {
        graph.to_document()
    }
}
