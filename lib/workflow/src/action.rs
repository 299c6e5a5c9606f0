//! Business action contract.
//!
//! Business nodes call out to capabilities the engine knows nothing about.
//! The engine only sees an [`ActionInvoker`]; [`ActionRegistry`] is the usual
//! implementation, dispatching on `actionKind` to registered
//! [`BusinessAction`]s.

use crate::execution::Variables;
use crate::node::NodeId;
use async_trait::async_trait;
use nodeflow_core::RunId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A request to run an external action for a business node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// The run the action is invoked for.
    pub run_id: RunId,
    /// The business node being executed.
    pub node_id: NodeId,
    /// The capability to invoke.
    pub action_kind: String,
    /// Static arguments from the node config.
    pub action_parameters: JsonValue,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// The response of an external action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    /// Variables to merge into the run on success.
    #[serde(default)]
    pub result_variables: Option<Variables>,
    /// Whether a failure may be retried.
    #[serde(default)]
    pub retryable_error: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionOutcome {
    /// A successful outcome without result variables.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A successful outcome carrying variables for the run.
    #[must_use]
    pub fn with_variables(result_variables: Variables) -> Self {
        Self {
            success: true,
            result_variables: Some(result_variables),
            ..Self::default()
        }
    }

    /// A failure that may be retried.
    #[must_use]
    pub fn retryable(error: impl Into<String>) -> Self {
        Self {
            retryable_error: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A failure that ends the run.
    #[must_use]
    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns the failure reason, with a generic fallback.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "action reported failure".to_string())
    }
}

/// Invokes external actions on behalf of the engine.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Runs the action described by `request` against the run's variables.
    ///
    /// Failures are reported in the outcome, never as panics or errors.
    async fn invoke(&self, request: &ActionRequest, variables: &Variables) -> ActionOutcome;
}

/// A single external capability, registered under an action kind.
#[async_trait]
pub trait BusinessAction: Send + Sync {
    async fn execute(&self, request: &ActionRequest, variables: &Variables) -> ActionOutcome;
}

/// Dispatches actions by kind.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn BusinessAction>>,
    fallback: Option<Arc<dyn BusinessAction>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, action: Arc<dyn BusinessAction>) {
        self.actions.insert(kind.into(), action);
    }

    /// Registers an action under `kind`.
    #[must_use]
    pub fn with_action(mut self, kind: impl Into<String>, action: Arc<dyn BusinessAction>) -> Self {
        self.register(kind, action);
        self
    }

    /// Sets the action that handles every unregistered kind.
    #[must_use]
    pub fn with_fallback(mut self, action: Arc<dyn BusinessAction>) -> Self {
        self.fallback = Some(action);
        self
    }

    /// Returns true if `kind` has a registered action.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.actions.contains_key(kind)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.actions.keys().collect();
        kinds.sort();
        f.debug_struct("ActionRegistry")
            .field("kinds", &kinds)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[async_trait]
impl ActionInvoker for ActionRegistry {
    async fn invoke(&self, request: &ActionRequest, variables: &Variables) -> ActionOutcome {
        let action = self
            .actions
            .get(&request.action_kind)
            .or(self.fallback.as_ref());

        match action {
            Some(action) => action.execute(request, variables).await,
            None => ActionOutcome::fatal(format!(
                "no action registered for kind '{}'",
                request.action_kind
            )),
        }
    }
}

/// Retry policy for retryable action failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Returns true if another attempt may follow attempt `attempt` (1-based).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Returns the wait before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}
