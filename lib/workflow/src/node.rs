//! Workflow node types and configurations.
//!
//! Nodes are the building blocks of a graph document. Each node has:
//! - An opaque id, unique within the document
//! - A type (Trigger, Delay, Decision or Business)
//! - A name and description for the editor
//! - Configuration specific to its type

use crate::error::DocumentError;
use crate::port::PortId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Identifier of a node within a graph document.
///
/// Node ids are chosen by the editor and are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The type of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Unique entry point that instantiates a run.
    Trigger,
    /// Pauses the run for a fixed duration.
    Delay,
    /// Branches on a boolean expression.
    Decision,
    /// Invokes an external business action.
    Business,
}

impl NodeType {
    /// Returns the output ports nodes of this type expose.
    #[must_use]
    pub fn ports(&self) -> &'static [&'static str] {
        match self {
            Self::Decision => &[PortId::YES, PortId::NO],
            Self::Trigger | Self::Delay | Self::Business => &[PortId::OUTPUT],
        }
    }

    /// Returns true if `port` is one of this type's output ports.
    #[must_use]
    pub fn has_port(&self, port: &PortId) -> bool {
        self.ports().contains(&port.as_str())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trigger => "trigger",
            Self::Delay => "delay",
            Self::Decision => "decision",
            Self::Business => "business",
        };
        f.write_str(name)
    }
}

/// Configuration for trigger nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    /// The external event class that instantiates a run.
    pub event_kind: String,
}

/// Configuration for delay nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    /// How long the run pauses, in seconds.
    pub duration_seconds: u64,
}

/// Configuration for decision nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionConfig {
    /// Boolean expression over the run's variables.
    pub condition_expression: String,
    /// Ports deliberately left unconnected; taking one ends the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terminal_ports: Vec<PortId>,
}

impl DecisionConfig {
    /// Returns true if `port` is explicitly marked as ending the flow.
    #[must_use]
    pub fn is_terminal_port(&self, port: &PortId) -> bool {
        self.terminal_ports.contains(port)
    }
}

/// Configuration for business nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessConfig {
    /// The external capability to invoke.
    pub action_kind: String,
    /// Static arguments passed to the capability.
    #[serde(default)]
    pub action_parameters: JsonValue,
}

/// Configuration for a node, varying by type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    /// Trigger node configuration.
    Trigger(TriggerConfig),
    /// Delay node configuration.
    Delay(DelayConfig),
    /// Decision node configuration.
    Decision(DecisionConfig),
    /// Business node configuration.
    Business(BusinessConfig),
}

impl NodeConfig {
    /// Returns the node type of this configuration.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Trigger(_) => NodeType::Trigger,
            Self::Delay(_) => NodeType::Delay,
            Self::Decision(_) => NodeType::Decision,
            Self::Business(_) => NodeType::Business,
        }
    }

    fn to_json(&self) -> JsonValue {
        let value = match self {
            Self::Trigger(config) => serde_json::to_value(config),
            Self::Delay(config) => serde_json::to_value(config),
            Self::Decision(config) => serde_json::to_value(config),
            Self::Business(config) => serde_json::to_value(config),
        };
        // Plain structs of strings, integers and JSON values always serialize.
        value.unwrap_or(JsonValue::Null)
    }

    fn from_json(node_type: NodeType, config: JsonValue) -> Result<Self, serde_json::Error> {
        Ok(match node_type {
            NodeType::Trigger => Self::Trigger(serde_json::from_value(config)?),
            NodeType::Delay => Self::Delay(serde_json::from_value(config)?),
            NodeType::Decision => Self::Decision(serde_json::from_value(config)?),
            NodeType::Business => Self::Business(serde_json::from_value(config)?),
        })
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    /// Identifier of this node within the document.
    pub id: NodeId,
    /// Human-readable name for this node.
    pub name: String,
    /// Free-form description shown in the editor.
    pub description: String,
    /// Node configuration (determines type and behavior).
    pub config: NodeConfig,
}

impl Node {
    /// Creates a new node with the given configuration.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            config,
        }
    }

    /// Creates a trigger node for the given event kind.
    #[must_use]
    pub fn trigger(id: &str, event_kind: impl Into<String>) -> Self {
        Self::new(
            id,
            id,
            NodeConfig::Trigger(TriggerConfig {
                event_kind: event_kind.into(),
            }),
        )
    }

    /// Creates a delay node.
    #[must_use]
    pub fn delay(id: &str, duration_seconds: u64) -> Self {
        Self::new(id, id, NodeConfig::Delay(DelayConfig { duration_seconds }))
    }

    /// Creates a decision node.
    #[must_use]
    pub fn decision(id: &str, condition_expression: impl Into<String>) -> Self {
        Self::new(
            id,
            id,
            NodeConfig::Decision(DecisionConfig {
                condition_expression: condition_expression.into(),
                terminal_ports: Vec::new(),
            }),
        )
    }

    /// Creates a business node.
    #[must_use]
    pub fn business(id: &str, action_kind: impl Into<String>, action_parameters: JsonValue) -> Self {
        Self::new(
            id,
            id,
            NodeConfig::Business(BusinessConfig {
                action_kind: action_kind.into(),
                action_parameters,
            }),
        )
    }

    /// Marks a decision port as deliberately unconnected.
    ///
    /// Has no effect on other node types.
    #[must_use]
    pub fn with_terminal_port(mut self, port: PortId) -> Self {
        if let NodeConfig::Decision(config) = &mut self.config {
            config.terminal_ports.push(port);
        }
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns the type of this node.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }

    /// Returns true if this node is a trigger.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.node_type() == NodeType::Trigger
    }

    /// Returns the event kind a trigger node listens for.
    #[must_use]
    pub fn event_kind(&self) -> Option<&str> {
        match &self.config {
            NodeConfig::Trigger(config) => Some(&config.event_kind),
            _ => None,
        }
    }
}

/// Wire representation of a node: the config is decoded according to `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default)]
    config: JsonValue,
}

impl TryFrom<RawNode> for Node {
    type Error = DocumentError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let config = NodeConfig::from_json(raw.node_type, raw.config).map_err(|e| {
            DocumentError::Malformed {
                reason: format!("node '{}': invalid {} config: {e}", raw.id, raw.node_type),
            }
        })?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            config,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        Self {
            node_type: node.node_type(),
            config: node.config.to_json(),
            id: node.id,
            name: node.name,
            description: node.description,
        }
    }
}
