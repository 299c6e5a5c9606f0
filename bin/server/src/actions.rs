//! Built-in business actions.

use async_trait::async_trait;
use nodeflow_workflow::{ActionOutcome, ActionRequest, BusinessAction, Variables};
use tracing::info;

/// Logs the invocation and succeeds without producing variables.
///
/// Registered as the fallback so that every action kind is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAction;

#[async_trait]
impl BusinessAction for LoggingAction {
    async fn execute(&self, request: &ActionRequest, _variables: &Variables) -> ActionOutcome {
        info!(
            run_id = %request.run_id,
            node_id = %request.node_id,
            action_kind = %request.action_kind,
            attempt = request.attempt,
            parameters = %request.action_parameters,
            "business action invoked"
        );
        ActionOutcome::succeeded()
    }
}
