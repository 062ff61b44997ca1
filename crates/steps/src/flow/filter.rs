use serde_json::{json, Value};

use super::{check, collect_items, parse_logged, require_str};
use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::result::ExecutionResult;

pub(super) fn validate(ctx: &ExecutionContext) -> Result<(), StepError> {
    require_str(ctx, "condition")
}

/// Scope for one element: its fields plus `item`, or `{value, item}` for scalars.
fn element_scope(item: &Value) -> Value {
    match item {
        Value::Object(map) => {
            let mut scope = map.clone();
            scope.insert("item".into(), item.clone());
            Value::Object(scope)
        }
        other => json!({"value": other, "item": other}),
    }
}

/// Keep the elements the predicate holds for, in their original order.
pub(super) fn execute(ctx: &ExecutionContext) -> ExecutionResult {
    let source = ctx.param_str("condition").unwrap_or_default();
    let items = collect_items(ctx);
    let total = items.len();

    let kept: Vec<Value> = match parse_logged(ctx, source) {
        Some(expr) => items
            .into_iter()
            .filter(|item| check(ctx, &expr, &element_scope(item)))
            .collect(),
        None => Vec::new(),
    };

    let kept_count = kept.len();
    ExecutionResult::success(json!({
        "items": kept,
        "kept": kept_count,
        "dropped": total - kept_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::flow_ctx;
    use super::super::FlowControlExecutor;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    #[tokio::test]
    async fn test_filter_positive_values() {
        let ctx = flow_ctx("filter", json!({"condition": "value > 0"}), json!([-1, 0, 3, 5]));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;

        assert!(result.is_success());
        assert_eq!(result.output_data["items"], json!([3, 5]));
        assert_eq!(result.output_data["dropped"], json!(2));
    }

    #[tokio::test]
    async fn test_filter_objects_by_field() {
        let ctx = flow_ctx(
            "filter",
            json!({"condition": "status == 'open'", "items_path": "tickets"}),
            json!({"tickets": [
                {"id": 1, "status": "open"},
                {"id": 2, "status": "closed"},
                {"id": 3, "status": "open"}
            ]}),
        );
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        let ids: Vec<_> = result.output_data["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn test_predicate_errors_exclude_element() {
        let ctx = flow_ctx(
            "filter",
            json!({"condition": "score > 10"}),
            json!([{"score": 11}, {"name": "no score"}, {"score": "high"}, {"score": 20}]),
        );
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.output_data["kept"], json!(2));
    }

    #[tokio::test]
    async fn test_singleton_collection() {
        let ctx = flow_ctx("filter", json!({"condition": "value > 0"}), json!(4));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert_eq!(result.output_data["items"], json!([4]));
    }

    #[tokio::test]
    async fn test_unparsable_predicate_keeps_nothing() {
        let ctx = flow_ctx("filter", json!({"condition": "value >"}), json!([1, 2]));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.output_data["items"], json!([]));
    }
}
