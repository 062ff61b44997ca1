use serde_json::{json, Value};

use super::{check, parse_logged, require_str, scope_of};
use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::result::{ExecutionResult, Route};

pub(super) fn validate(ctx: &ExecutionContext) -> Result<(), StepError> {
    require_str(ctx, "condition")
}

/// Evaluate `condition` against the input and pick the branch.
///
/// `next_action` is `continue` when the condition holds and `skip` otherwise.
/// When the chosen branch names a path only that path is followed; without
/// branch names a true condition follows every edge and a false one halts.
pub(super) fn execute(ctx: &ExecutionContext) -> ExecutionResult {
    let source = ctx.param_str("condition").unwrap_or_default();
    let scope = scope_of(&ctx.input_data);

    let outcome = parse_logged(ctx, source)
        .map(|expr| check(ctx, &expr, &scope))
        .unwrap_or(false);

    let selected = if outcome {
        ctx.param_str("true_path")
    } else {
        ctx.param_str("false_path")
    };

    let route = match selected {
        Some(path) => Route::path(path),
        None if outcome => Route::All,
        None => Route::Halt,
    };

    tracing::debug!(
        execution_id = %ctx.execution_id,
        step_id = %ctx.step_id,
        condition = %source,
        result = outcome,
        "Evaluated conditional"
    );

    ExecutionResult::success(json!({
        "condition": source,
        "condition_result": outcome,
        "next_action": if outcome { "continue" } else { "skip" },
        "selected_path": selected.map(|p| Value::String(p.to_string())).unwrap_or(Value::Null),
        "data": ctx.input_data.clone(),
    }))
    .with_route(route)
}
