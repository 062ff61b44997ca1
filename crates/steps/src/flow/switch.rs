use serde_json::{json, Value};

use super::{require_str, scope_of};
use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::expression::{self, value_to_key};
use crate::result::{ExecutionResult, Route};

pub(super) fn validate(ctx: &ExecutionContext) -> Result<(), StepError> {
    require_str(ctx, "expression")?;
    match ctx.param("cases") {
        Some(Value::Object(cases)) if !cases.is_empty() => Ok(()),
        Some(Value::Object(_)) if ctx.param_str("default_case").is_some() => Ok(()),
        _ => Err(StepError::Validation(
            "'cases' must be a non-empty object".into(),
        )),
    }
}

/// Match the expression value against `cases` keys, first match in declaration order.
pub(super) fn execute(ctx: &ExecutionContext) -> ExecutionResult {
    let source = ctx.param_str("expression").unwrap_or_default();
    let scope = scope_of(&ctx.input_data);

    let value = match expression::evaluate_value(source, &scope) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                step_id = %ctx.step_id,
                expression = %source,
                error = %e,
                "Switch expression failed, using default case"
            );
            None
        }
    };

    let key = value.as_ref().map(value_to_key);
    let matched = match (ctx.param("cases"), key.as_deref()) {
        (Some(Value::Object(cases)), Some(key)) => cases
            .iter()
            .find(|(case, _)| case.as_str() == key)
            .map(|(case, action)| (case.clone(), value_to_key(action))),
        _ => None,
    };

    let action = match &matched {
        Some((_, action)) => Some(action.clone()),
        None => ctx.param_str("default_case").map(str::to_string),
    };

    let route = match &action {
        Some(action) => Route::path(action.clone()),
        None => Route::Halt,
    };

    tracing::debug!(
        execution_id = %ctx.execution_id,
        step_id = %ctx.step_id,
        value = ?key,
        action = ?action,
        "Evaluated switch"
    );

    ExecutionResult::success(json!({
        "switch_value": value.unwrap_or(Value::Null),
        "matched_case": matched.map(|(case, _)| Value::String(case)).unwrap_or(Value::Null),
        "selected_action": action.map(Value::String).unwrap_or(Value::Null),
        "data": ctx.input_data.clone(),
    }))
    .with_route(route)
}
