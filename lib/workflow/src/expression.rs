//! Decision condition evaluation.
//!
//! Conditions are JEXL expressions evaluated against the run's variables.
//! Variables are always passed as the evaluation context, never spliced into
//! the expression text.

use crate::error::HandlerError;
use crate::execution::Variables;
use serde_json::Value;

/// Evaluates a condition expression to a boolean.
///
/// The result is coerced with JavaScript-like truthiness: `false`, `null`,
/// `0` and `""` are false, everything else is true.
///
/// # Errors
///
/// Returns `HandlerError::ConditionFailed` if the expression cannot be parsed
/// or evaluated.
pub fn evaluate_condition(expression: &str, variables: &Variables) -> Result<bool, HandlerError> {
    let context = Value::Object(variables.clone());
    let result = jexl_eval::Evaluator::new()
        .eval_in_context(expression, &context)
        .map_err(|e| HandlerError::ConditionFailed {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;
    Ok(truthy(&result))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
