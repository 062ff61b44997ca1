use serde_json::{json, Value};

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::result::ExecutionResult;

pub(super) fn validate(ctx: &ExecutionContext) -> Result<(), StepError> {
    if ctx.param_str("strategy") == Some("select") {
        match ctx.param("fields") {
            Some(Value::Array(fields)) if fields.iter().all(Value::is_string) => {}
            _ => {
                return Err(StepError::Validation(
                    "select strategy requires 'fields' as a list of strings".into(),
                ))
            }
        }
    }
    Ok(())
}

/// Sources a merge combines: each upstream output when several parents are
/// active, else the elements of an array input, else the input itself.
fn sources(ctx: &ExecutionContext) -> Vec<Value> {
    if ctx.upstream.len() > 1 {
        return ctx.upstream.values().cloned().collect();
    }
    match &ctx.input_data {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn combine(sources: &[Value]) -> JsonMap {
    let mut merged = JsonMap::new();
    for source in sources {
        if let Value::Object(map) = source {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

pub(super) fn execute(ctx: &ExecutionContext) -> ExecutionResult {
    let strategy = ctx.param_str_or("strategy", "combine");
    let sources = sources(ctx);
    let source_count = sources.len();

    let output = match strategy {
        "combine" => Value::Object(combine(&sources)),
        "array" => json!({ "items": sources }),
        "select" => {
            let combined = combine(&sources);
            let mut selected = JsonMap::new();
            if let Some(Value::Array(fields)) = ctx.param("fields") {
                for field in fields.iter().filter_map(Value::as_str) {
                    if let Some(value) = combined.get(field) {
                        selected.insert(field.to_string(), value.clone());
                    }
                }
            }
            Value::Object(selected)
        }
        other => {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                step_id = %ctx.step_id,
                strategy = %other,
                "Unknown merge strategy, passing input through"
            );
            ctx.input_data.clone()
        }
    };

    ExecutionResult::success(output)
        .with_metadata("merge_strategy", json!(strategy))
        .with_metadata("source_count", json!(source_count))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::flow_ctx;
    use super::super::FlowControlExecutor;
    use crate::context::JsonMap;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    fn upstream() -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("fetch_user".into(), json!({"user": "ana", "plan": "free"}));
        map.insert("fetch_plan".into(), json!({"plan": "pro", "seats": 5}));
        map
    }

    #[tokio::test]
    async fn test_combine_upstream_later_wins() {
        let ctx = flow_ctx("merge", json!({"strategy": "combine"}), json!({}))
            .with_upstream(upstream());
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;

        assert_eq!(
            result.output_value(),
            json!({"user": "ana", "plan": "pro", "seats": 5})
        );
        assert_eq!(result.metadata["source_count"], json!(2));
    }

    #[tokio::test]
    async fn test_array_wraps_sources() {
        let ctx = flow_ctx("merge", json!({"strategy": "array"}), json!({}))
            .with_upstream(upstream());
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert_eq!(result.output_data["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_select_projects_fields() {
        let ctx = flow_ctx(
            "merge",
            json!({"strategy": "select", "fields": ["user", "seats", "absent"]}),
            json!({}),
        )
        .with_upstream(upstream());
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert_eq!(result.output_value(), json!({"user": "ana", "seats": 5}));
    }

    #[tokio::test]
    async fn test_array_input_is_merged() {
        let ctx = flow_ctx("merge", json!({}), json!([{"a": 1}, {"b": 2}]));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert_eq!(result.output_value(), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_unknown_strategy_passes_through() {
        let ctx = flow_ctx("merge", json!({"strategy": "zip"}), json!({"keep": true}));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.output_value(), json!({"keep": true}));
    }

    #[tokio::test]
    async fn test_select_requires_fields() {
        let ctx = flow_ctx("merge", json!({"strategy": "select"}), json!({}));
        let result = StepRunner::default().run(&FlowControlExecutor, &ctx).await;
        assert!(result.is_error());
    }
}
