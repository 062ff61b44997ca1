//! Flow-control step kind.
//!
//! A `flow` step decides traversal instead of doing external work. Sub-kinds:
//! `if`/`conditional`, `switch`, `for_each`/`loop`, `while`, `merge`, `split`,
//! `filter`. Predicate failures never escape a flow step; they are logged and
//! resolve to the falsy or no-match branch.

mod conditional;
mod filter;
mod iteration;
mod merge;
mod split;
mod switch;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::expression::{self, Expression};
use crate::registry::StepExecutor;
use crate::result::{ExecutionResult, RESULT_KEY};

/// Default cap for for-each iterations.
pub const DEFAULT_FOR_EACH_LIMIT: u64 = 1000;

/// Default cap for while-loop rounds.
pub const DEFAULT_WHILE_LIMIT: u64 = 100;

/// Flow sub-kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Conditional,
    Switch,
    ForEach,
    While,
    Merge,
    Split,
    Filter,
}

impl FlowKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "if" | "conditional" => Some(FlowKind::Conditional),
            "switch" => Some(FlowKind::Switch),
            "for_each" | "foreach" | "loop" => Some(FlowKind::ForEach),
            "while" => Some(FlowKind::While),
            "merge" => Some(FlowKind::Merge),
            "split" => Some(FlowKind::Split),
            "filter" => Some(FlowKind::Filter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Conditional => "conditional",
            FlowKind::Switch => "switch",
            FlowKind::ForEach => "for_each",
            FlowKind::While => "while",
            FlowKind::Merge => "merge",
            FlowKind::Split => "split",
            FlowKind::Filter => "filter",
        }
    }
}

/// Executor for the `flow` step kind.
#[derive(Debug, Clone, Default)]
pub struct FlowControlExecutor;

impl FlowControlExecutor {
    pub fn new() -> Self {
        Self
    }

    fn flow_kind(ctx: &ExecutionContext) -> Result<FlowKind, StepError> {
        let name = ctx
            .subtype
            .as_deref()
            .or_else(|| ctx.param_str("flow_type"))
            .ok_or_else(|| StepError::Validation("flow step requires a sub-kind".into()))?;
        FlowKind::parse(name)
            .ok_or_else(|| StepError::Validation(format!("unknown flow sub-kind '{}'", name)))
    }
}

#[async_trait]
impl StepExecutor for FlowControlExecutor {
    fn kind(&self) -> &'static str {
        "flow"
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        match Self::flow_kind(ctx)? {
            FlowKind::Conditional => conditional::validate(ctx),
            FlowKind::Switch => switch::validate(ctx),
            FlowKind::ForEach => iteration::validate_for_each(ctx),
            FlowKind::While => iteration::validate_while(ctx),
            FlowKind::Merge => merge::validate(ctx),
            FlowKind::Split => split::validate(ctx),
            FlowKind::Filter => filter::validate(ctx),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        let kind = Self::flow_kind(ctx)?;
        let result = match kind {
            FlowKind::Conditional => conditional::execute(ctx),
            FlowKind::Switch => switch::execute(ctx),
            FlowKind::ForEach => iteration::execute_for_each(ctx),
            FlowKind::While => iteration::execute_while(ctx),
            FlowKind::Merge => merge::execute(ctx),
            FlowKind::Split => split::execute(ctx)?,
            FlowKind::Filter => filter::execute(ctx),
        };
        Ok(result.with_metadata("flow_kind", Value::String(kind.as_str().to_string())))
    }
}

/// Scope expressions are evaluated against: the input object, or `{value: input}`.
pub(crate) fn scope_of(input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        other => {
            let mut map = JsonMap::new();
            map.insert("value".into(), other.clone());
            Value::Object(map)
        }
    }
}

/// Evaluate a predicate, logging and coercing any failure to `false`.
pub(crate) fn check(ctx: &ExecutionContext, expr: &Expression, scope: &Value) -> bool {
    match expr.is_true(scope) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                step_id = %ctx.step_id,
                expression = %expr.source(),
                error = %e,
                "Condition evaluation failed, treating as false"
            );
            false
        }
    }
}

/// Parse a predicate, logging failures. `None` means "never true".
pub(crate) fn parse_logged(ctx: &ExecutionContext, source: &str) -> Option<Expression> {
    match Expression::parse(source) {
        Ok(expr) => Some(expr),
        Err(e) => {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                step_id = %ctx.step_id,
                expression = %source,
                error = %e,
                "Condition could not be parsed, treating as false"
            );
            None
        }
    }
}

/// Resolve the collection a for-each/filter works on.
///
/// Looks up `items_path` in the input (or takes the whole input), then boxes
/// anything that is not an array as a single element. Missing values and
/// `null` yield an empty collection.
pub(crate) fn collect_items(ctx: &ExecutionContext) -> Vec<Value> {
    let resolved = match ctx.param_str("items_path") {
        Some(path) => match expression::lookup_path(&ctx.input_data, path) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    step_id = %ctx.step_id,
                    items_path = %path,
                    "Collection path not found in input"
                );
                Value::Null
            }
        },
        None => ctx.input_data.clone(),
    };

    match resolved {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        // an upstream step that produced a bare list
        Value::Object(mut map) if map.len() == 1 && map.get(RESULT_KEY).is_some_and(Value::is_array) => {
            match map.remove(RESULT_KEY) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        other => vec![other],
    }
}

pub(crate) fn require_str(ctx: &ExecutionContext, name: &str) -> Result<(), StepError> {
    ctx.param_str(name)
        .map(|_| ())
        .ok_or_else(|| StepError::Validation(format!("missing required parameter '{}'", name)))
}

pub(crate) fn optional_limit(ctx: &ExecutionContext, name: &str) -> Result<(), StepError> {
    match ctx.param(name) {
        None => Ok(()),
        Some(_) => ctx.param_u64(name).map(|_| ()).ok_or_else(|| {
            StepError::Validation(format!("'{}' must be a non-negative integer", name))
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::flow_ctx;
    use super::*;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    #[test]
    fn test_flow_kind_parse() {
        assert_eq!(FlowKind::parse("if"), Some(FlowKind::Conditional));
        assert_eq!(FlowKind::parse("LOOP"), Some(FlowKind::ForEach));
        assert_eq!(FlowKind::parse("goto"), None);
    }

    #[tokio::test]
    async fn test_unknown_sub_kind_fails_validation() {
        let ctx = flow_ctx("goto", json!({}), json!({}));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_error());
        assert_eq!(result.error_details.unwrap()["error_type"], json!("ValidationError"));
    }

    #[tokio::test]
    async fn test_flow_type_parameter_fallback() {
        let ctx = ExecutionContext::new("wf", "ex", "s")
            .with_kind("flow", None)
            .with_parameters(json!({"flow_type": "if", "condition": "x == 1"}))
            .with_input(json!({"x": 1}));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.metadata["flow_kind"], json!("conditional"));
    }

    #[test]
    fn test_collect_items_boxing() {
        let ctx = flow_ctx("for_each", json!({"items_path": "order"}), json!({"order": {"id": 1}}));
        assert_eq!(collect_items(&ctx), vec![json!({"id": 1})]);

        let ctx = flow_ctx("for_each", json!({"items_path": "nope"}), json!({}));
        assert!(collect_items(&ctx).is_empty());

        let ctx = flow_ctx("for_each", json!({}), json!([1, 2]));
        assert_eq!(collect_items(&ctx).len(), 2);
    }

    #[test]
    fn test_collect_items_unwraps_list_output() {
        let upstream = crate::result::ExecutionResult::success(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        let ctx = flow_ctx("for_each", json!({}), upstream.output_value());
        assert_eq!(collect_items(&ctx).len(), 3);

        // a real field that happens to be named `result` stays one item
        let ctx = flow_ctx("filter", json!({}), json!({"result": [1, 2], "count": 2}));
        assert_eq!(collect_items(&ctx).len(), 1);
    }
}
