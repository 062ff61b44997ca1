//! Data actions that need no external collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::registry::StepExecutor;
use crate::result::ExecutionResult;

/// Executor for the `action` step kind (`set`, `passthrough`).
#[derive(Debug, Clone, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    fn action(ctx: &ExecutionContext) -> &str {
        ctx.subtype
            .as_deref()
            .or_else(|| ctx.param_str("action"))
            .unwrap_or("set")
    }
}

#[async_trait]
impl StepExecutor for ActionExecutor {
    fn kind(&self) -> &'static str {
        "action"
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        match Self::action(ctx) {
            "set" => match ctx.param("values") {
                Some(Value::Object(_)) => Ok(()),
                _ => Err(StepError::Validation(
                    "set action requires 'values' as an object".into(),
                )),
            },
            "passthrough" => Ok(()),
            other => Err(StepError::Validation(format!("unknown action '{}'", other))),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        if Self::action(ctx) == "passthrough" {
            return Ok(ExecutionResult::success(ctx.input_data.clone()));
        }

        let keep_input = ctx.param_bool("keep_input").unwrap_or(true);
        let mut output = match (&ctx.input_data, keep_input) {
            (Value::Object(map), true) => map.clone(),
            _ => JsonMap::new(),
        };

        if let Some(Value::Object(values)) = ctx.param("values") {
            for (key, value) in values {
                output.insert(key.clone(), value.clone());
            }
        }

        Ok(ExecutionResult::success(Value::Object(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_merges_values() {
        let ctx = ExecutionContext::new("wf", "ex", "tag")
            .with_kind("action", Some("set"))
            .with_parameters(json!({"values": {"priority": "high"}}))
            .with_input(json!({"id": 1, "priority": "low"}));

        let result = StepRunner::default().run(&ActionExecutor, &ctx).await;
        assert_eq!(result.output_value(), json!({"id": 1, "priority": "high"}));
    }

    #[tokio::test]
    async fn test_set_replaces_input() {
        let ctx = ExecutionContext::new("wf", "ex", "tag")
            .with_kind("action", Some("set"))
            .with_parameters(json!({"values": {"a": 1}, "keep_input": false}))
            .with_input(json!({"id": 1}));

        let result = StepRunner::default().run(&ActionExecutor, &ctx).await;
        assert_eq!(result.output_value(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let ctx = ExecutionContext::new("wf", "ex", "noop")
            .with_kind("action", Some("passthrough"))
            .with_input(json!({"x": [1, 2]}));

        let result = StepRunner::default().run(&ActionExecutor, &ctx).await;
        assert_eq!(result.output_value(), json!({"x": [1, 2]}));
    }

    #[tokio::test]
    async fn test_set_without_values_fails() {
        let ctx = ExecutionContext::new("wf", "ex", "tag").with_kind("action", Some("set"));
        let result = StepRunner::default().run(&ActionExecutor, &ctx).await;
        assert!(result.is_error());
    }
}
