use serde_json::{json, Value};

use super::{
    check, collect_items, optional_limit, parse_logged, require_str, scope_of,
    DEFAULT_FOR_EACH_LIMIT, DEFAULT_WHILE_LIMIT,
};
use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::result::ExecutionResult;

pub(super) fn validate_for_each(ctx: &ExecutionContext) -> Result<(), StepError> {
    optional_limit(ctx, "max_iterations")
}

/// Iterate over at most `max_iterations` elements of the resolved collection.
///
/// Truncation is silent apart from the `truncated` flag in the output.
pub(super) fn execute_for_each(ctx: &ExecutionContext) -> ExecutionResult {
    let limit = ctx
        .param_u64("max_iterations")
        .unwrap_or(DEFAULT_FOR_EACH_LIMIT) as usize;
    let items = collect_items(ctx);
    let total = items.len();

    let iterations: Vec<Value> = items
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, item)| json!({"index": index, "item": item}))
        .collect();
    let count = iterations.len();

    if count < total {
        tracing::debug!(
            execution_id = %ctx.execution_id,
            step_id = %ctx.step_id,
            total,
            limit,
            "For-each truncated at max_iterations"
        );
    }

    ExecutionResult::success(json!({
        "iterations": count,
        "total_items": total,
        "truncated": count < total,
        "results": iterations,
    }))
}

pub(super) fn validate_while(ctx: &ExecutionContext) -> Result<(), StepError> {
    require_str(ctx, "condition")?;
    optional_limit(ctx, "max_iterations")
}

/// Count rounds while the condition holds over the input plus `counter`.
pub(super) fn execute_while(ctx: &ExecutionContext) -> ExecutionResult {
    let limit = ctx.param_u64("max_iterations").unwrap_or(DEFAULT_WHILE_LIMIT);
    let source = ctx.param_str("condition").unwrap_or_default();
    let expr = parse_logged(ctx, source);

    let base: JsonMap = match scope_of(&ctx.input_data) {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    };

    let mut counter: u64 = 0;
    let stopped_by = loop {
        if counter >= limit {
            break "max_iterations";
        }
        let Some(expr) = expr.as_ref() else {
            break "condition";
        };

        let mut scope = base.clone();
        scope.insert("counter".into(), json!(counter));
        if !check(ctx, expr, &Value::Object(scope)) {
            break "condition";
        }
        counter += 1;
    };

    ExecutionResult::success(json!({
        "iterations": counter,
        "stopped_by": stopped_by,
        "data": ctx.input_data.clone(),
    }))
}
