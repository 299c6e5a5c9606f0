//! Static analysis of workflow graphs.
//!
//! Every check runs on every call so the editor sees all problems at once.
//! A draft may be saved while invalid; only a valid graph can be published.

use crate::document::GraphDocument;
use crate::error::DocumentError;
use crate::graph::WorkflowGraph;
use crate::node::{NodeConfig, NodeId};
use crate::port::PortId;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, EdgeRef};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// A single problem found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ValidationError {
    /// The graph has zero or several trigger nodes.
    TriggerCount { found: usize },
    /// A port carries more edges than it may.
    PortArity { node: NodeId, port: PortId, edges: usize },
    /// An edge leaves a port the node type does not have.
    UnknownPort { node: NodeId, port: PortId },
    /// A decision port has no edge and is not marked terminal.
    UnmarkedBranch { node: NodeId, port: PortId },
    /// `terminalPorts` names a port the decision node does not have.
    UnknownTerminalPort { node: NodeId, port: PortId },
    /// A port is marked terminal but also carries an edge.
    ConnectedTerminalPort { node: NodeId, port: PortId },
    /// The node cannot be reached from the trigger.
    Unreachable { node: NodeId },
    /// The nodes form a cycle reachable from the trigger.
    Cycle { nodes: Vec<NodeId> },
    /// An edge leaves and enters the same node.
    SelfLoop { node: NodeId },
}

impl ValidationError {
    /// Returns a stable name for the kind of error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TriggerCount { .. } => "triggerCount",
            Self::PortArity { .. } => "portArity",
            Self::UnknownPort { .. } => "unknownPort",
            Self::UnmarkedBranch { .. } => "unmarkedBranch",
            Self::UnknownTerminalPort { .. } => "unknownTerminalPort",
            Self::ConnectedTerminalPort { .. } => "connectedTerminalPort",
            Self::Unreachable { .. } => "unreachable",
            Self::Cycle { .. } => "cycle",
            Self::SelfLoop { .. } => "selfLoop",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerCount { found } => {
                write!(f, "expected exactly one trigger node, found {found}")
            }
            Self::PortArity { node, port, edges } => {
                write!(f, "port '{port}' of node '{node}' has {edges} edges, at most 1 allowed")
            }
            Self::UnknownPort { node, port } => {
                write!(f, "node '{node}' has no port '{port}'")
            }
            Self::UnmarkedBranch { node, port } => {
                write!(f, "port '{port}' of node '{node}' is unconnected and not marked terminal")
            }
            Self::UnknownTerminalPort { node, port } => {
                write!(f, "node '{node}' marks unknown port '{port}' as terminal")
            }
            Self::ConnectedTerminalPort { node, port } => {
                write!(f, "port '{port}' of node '{node}' is marked terminal but has an edge")
            }
            Self::Unreachable { node } => write!(f, "node '{node}' is unreachable from the trigger"),
            Self::Cycle { nodes } => {
                let ids: Vec<_> = nodes.iter().map(NodeId::as_str).collect();
                write!(f, "cycle through nodes {}", ids.join(" -> "))
            }
            Self::SelfLoop { node } => write!(f, "node '{node}' has an edge to itself"),
        }
    }
}

/// The outcome of validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "errors", rename_all = "camelCase")]
pub enum ValidationResult {
    /// The graph may be published.
    Valid,
    /// The graph has problems, sorted deterministically.
    Invalid(Vec<ValidationError>),
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns the errors found, empty when valid.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Self::Valid => &[],
            Self::Invalid(errors) => errors,
        }
    }

    fn from_errors(mut errors: Vec<ValidationError>) -> Self {
        if errors.is_empty() {
            return Self::Valid;
        }
        errors.sort();
        errors.dedup();
        Self::Invalid(errors)
    }
}

/// Validates a document.
///
/// # Errors
///
/// Returns `DocumentError::Malformed` if the document cannot be built into a
/// graph at all (duplicate node ids or dangling edges).
pub fn validate_document(document: &GraphDocument) -> Result<ValidationResult, DocumentError> {
    Ok(validate(&WorkflowGraph::from_document(document)?))
}

/// Validates a graph.
#[must_use]
pub fn validate(graph: &WorkflowGraph) -> ValidationResult {
    let mut errors = Vec::new();

    let triggers = graph.triggers();
    if triggers.len() != 1 {
        errors.push(ValidationError::TriggerCount {
            found: triggers.len(),
        });
    }

    check_ports(graph, &mut errors);

    if let [trigger] = triggers.as_slice() {
        check_reachability(graph, &trigger.id, &mut errors);
    }

    let roots: Vec<&NodeId> = if triggers.is_empty() {
        graph.nodes().map(|node| &node.id).collect()
    } else {
        triggers.iter().map(|node| &node.id).collect()
    };
    check_cycles(graph, roots, &mut errors);

    check_self_loops(graph, &mut errors);

    ValidationResult::from_errors(errors)
}

fn check_ports(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        let node_type = node.node_type();
        let mut per_port: BTreeMap<&PortId, usize> = BTreeMap::new();
        for edge in graph.outgoing_edges(&node.id, None) {
            *per_port.entry(edge.port).or_default() += 1;
        }

        for (port, count) in &per_port {
            if !node_type.has_port(port) {
                errors.push(ValidationError::UnknownPort {
                    node: node.id.clone(),
                    port: (*port).clone(),
                });
            } else if *count > 1 {
                errors.push(ValidationError::PortArity {
                    node: node.id.clone(),
                    port: (*port).clone(),
                    edges: *count,
                });
            }
        }

        if let NodeConfig::Decision(config) = &node.config {
            for port in [PortId::yes(), PortId::no()] {
                if !per_port.contains_key(&port) && !config.is_terminal_port(&port) {
                    errors.push(ValidationError::UnmarkedBranch {
                        node: node.id.clone(),
                        port,
                    });
                }
            }

            for port in &config.terminal_ports {
                if !node_type.has_port(port) {
                    errors.push(ValidationError::UnknownTerminalPort {
                        node: node.id.clone(),
                        port: port.clone(),
                    });
                } else if per_port.contains_key(port) {
                    errors.push(ValidationError::ConnectedTerminalPort {
                        node: node.id.clone(),
                        port: port.clone(),
                    });
                }
            }
        }
    }
}

fn check_reachability(graph: &WorkflowGraph, trigger: &NodeId, errors: &mut Vec<ValidationError>) {
    let Some(start) = graph.index_of(trigger) else {
        return;
    };

    let inner = graph.inner();
    let mut reached = HashSet::new();
    let mut dfs = Dfs::new(inner, start);
    while let Some(index) = dfs.next(inner) {
        reached.insert(index);
    }

    for index in inner.node_indices() {
        if !reached.contains(&index) {
            errors.push(ValidationError::Unreachable {
                node: inner[index].id.clone(),
            });
        }
    }
}

/// Depth-first search with an explicit recursion stack.
///
/// Neighbors and roots are visited in id order so the reported cycles do not
/// depend on the order nodes appear in the document.
fn check_cycles(graph: &WorkflowGraph, mut roots: Vec<&NodeId>, errors: &mut Vec<ValidationError>) {
    roots.sort();

    let mut visited = HashSet::new();
    let mut found = BTreeSet::new();
    for root in roots {
        if let Some(index) = graph.index_of(root) {
            visit(graph, index, &mut visited, &mut found);
        }
    }

    errors.extend(found.into_iter().map(|nodes| ValidationError::Cycle { nodes }));
}

/// A node on the current path and how far through its neighbors we are.
struct Frame {
    index: NodeIndex,
    neighbors: Vec<NodeIndex>,
    cursor: usize,
}

impl Frame {
    fn enter(graph: &WorkflowGraph, index: NodeIndex) -> Self {
        let inner = graph.inner();
        let mut neighbors: Vec<NodeIndex> = inner
            .edges(index)
            .map(|edge| edge.target())
            .filter(|target| *target != index)
            .collect();
        neighbors.sort_by(|a, b| inner[*a].id.cmp(&inner[*b].id));
        neighbors.dedup();
        Self {
            index,
            neighbors,
            cursor: 0,
        }
    }
}

/// Walks everything reachable from `root`, iteratively, so path length is
/// bounded by the heap rather than the thread stack.
fn visit(
    graph: &WorkflowGraph,
    root: NodeIndex,
    visited: &mut HashSet<NodeIndex>,
    found: &mut BTreeSet<Vec<NodeId>>,
) {
    if !visited.insert(root) {
        return;
    }

    let inner = graph.inner();
    let mut path = vec![Frame::enter(graph, root)];
    // Depth of every node currently on `path`.
    let mut on_path: HashMap<NodeIndex, usize> = HashMap::from([(root, 0)]);

    while let Some(frame) = path.last_mut() {
        let next = frame.neighbors.get(frame.cursor).copied();
        frame.cursor += 1;

        let Some(next) = next else {
            if let Some(done) = path.pop() {
                on_path.remove(&done.index);
            }
            continue;
        };

        if let Some(&depth) = on_path.get(&next) {
            let mut cycle: Vec<NodeId> = path[depth..]
                .iter()
                .map(|frame| inner[frame.index].id.clone())
                .collect();
            rotate_to_smallest(&mut cycle);
            found.insert(cycle);
        } else if visited.insert(next) {
            on_path.insert(next, path.len());
            path.push(Frame::enter(graph, next));
        }
    }
}

fn rotate_to_smallest(cycle: &mut [NodeId]) {
    let smallest = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(position, _)| position);
    cycle.rotate_left(smallest);
}

fn check_self_loops(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    for edge in graph.edges() {
        if edge.is_self_loop() {
            errors.push(ValidationError::SelfLoop {
                node: edge.source.id.clone(),
            });
        }
    }
}
