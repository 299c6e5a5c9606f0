//! Node handlers.
//!
//! A handler is a pure function of a node's config and the run's variables.
//! It never touches the run: it returns the port to leave through, variable
//! updates, and at most one request for the engine to act on.

use crate::error::HandlerError;
use crate::execution::Variables;
use crate::expression::evaluate_condition;
use crate::node::{BusinessConfig, DecisionConfig, DelayConfig, Node, NodeConfig};
use crate::port::PortId;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// What a handler asks the engine to do before following `next_port`.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Move on immediately.
    Continue,
    /// Park the run for `duration`.
    Pause { duration: Duration },
    /// Invoke an external action and wait for its response.
    InvokeAction {
        action_kind: String,
        action_parameters: JsonValue,
    },
}

/// The result of handling one node.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub next_port: PortId,
    pub variable_updates: Variables,
    pub effect: Effect,
}

impl HandlerResult {
    fn continue_through(port: PortId) -> Self {
        Self {
            next_port: port,
            variable_updates: Variables::new(),
            effect: Effect::Continue,
        }
    }

    fn with_effect(effect: Effect) -> Self {
        Self {
            next_port: PortId::output(),
            variable_updates: Variables::new(),
            effect,
        }
    }
}

/// Handles `node` against the run's variables.
///
/// # Errors
///
/// Returns `HandlerError` if a decision condition cannot be evaluated.
pub fn handle(node: &Node, variables: &Variables) -> Result<HandlerResult, HandlerError> {
    match &node.config {
        NodeConfig::Trigger(_) => Ok(HandlerResult::continue_through(PortId::output())),
        NodeConfig::Delay(config) => Ok(handle_delay(config)),
        NodeConfig::Decision(config) => handle_decision(config, variables),
        NodeConfig::Business(config) => Ok(handle_business(config)),
    }
}

fn handle_delay(config: &DelayConfig) -> HandlerResult {
    HandlerResult::with_effect(Effect::Pause {
        duration: Duration::from_secs(config.duration_seconds),
    })
}

fn handle_decision(
    config: &DecisionConfig,
    variables: &Variables,
) -> Result<HandlerResult, HandlerError> {
    let outcome = evaluate_condition(&config.condition_expression, variables)?;
    Ok(HandlerResult::continue_through(PortId::for_condition(outcome)))
}

fn handle_business(config: &BusinessConfig) -> HandlerResult {
    HandlerResult::with_effect(Effect::InvokeAction {
        action_kind: config.action_kind.clone(),
        action_parameters: config.action_parameters.clone(),
    })
}
