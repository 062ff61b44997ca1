//! Trigger steps: the entry points of a workflow.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::registry::StepExecutor;
use crate::result::ExecutionResult;

const TRIGGER_TYPES: &[&str] = &["manual", "webhook", "schedule"];

/// Executor for the `trigger` step kind (`manual`, `webhook`, `schedule`).
#[derive(Debug, Clone, Default)]
pub struct TriggerExecutor;

impl TriggerExecutor {
    pub fn new() -> Self {
        Self
    }

    fn trigger_type(ctx: &ExecutionContext) -> &str {
        ctx.subtype
            .as_deref()
            .or_else(|| ctx.param_str("trigger_type"))
            .unwrap_or("manual")
    }
}

#[async_trait]
impl StepExecutor for TriggerExecutor {
    fn kind(&self) -> &'static str {
        "trigger"
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        let trigger_type = Self::trigger_type(ctx);
        if !TRIGGER_TYPES.contains(&trigger_type) {
            return Err(StepError::Validation(format!(
                "unknown trigger type '{}'",
                trigger_type
            )));
        }

        if let Some(payload) = ctx.param("payload") {
            if !payload.is_object() {
                return Err(StepError::Validation("'payload' must be an object".into()));
            }
        }

        if trigger_type == "schedule" && ctx.param_str("cron").is_none() {
            return Err(StepError::Validation(
                "schedule trigger requires 'cron'".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        let mut output = match &ctx.input_data {
            Value::Object(map) => map.clone(),
            Value::Null => JsonMap::new(),
            other => {
                let mut map = JsonMap::new();
                map.insert("input".into(), other.clone());
                map
            }
        };

        if let Some(Value::Object(payload)) = ctx.param("payload") {
            for (key, value) in payload {
                output.insert(key.clone(), value.clone());
            }
        }

        output.insert(
            "triggered_at".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        output.insert(
            "trigger_type".into(),
            Value::String(Self::trigger_type(ctx).to_string()),
        );

        Ok(ExecutionResult::success(Value::Object(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    #[tokio::test]
    async fn test_manual_trigger_merges_payload() {
        let ctx = ExecutionContext::new("wf", "ex", "start")
            .with_kind("trigger", Some("manual"))
            .with_parameters(json!({"payload": {"source": "api"}}))
            .with_input(json!({"order_id": 7}));

        let result = StepRunner::default().run(&TriggerExecutor, &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.output_data["order_id"], json!(7));
        assert_eq!(result.output_data["source"], json!("api"));
        assert_eq!(result.output_data["trigger_type"], json!("manual"));
        assert!(result.output_data.contains_key("triggered_at"));
    }

    #[tokio::test]
    async fn test_schedule_requires_cron() {
        let ctx = ExecutionContext::new("wf", "ex", "start").with_kind("trigger", Some("schedule"));
        let result = StepRunner::default().run(&TriggerExecutor, &ctx).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_unknown_trigger_type() {
        let ctx = ExecutionContext::new("wf", "ex", "start").with_kind("trigger", Some("email"));
        let result = StepRunner::default().run(&TriggerExecutor, &ctx).await;
        assert!(result.is_error());
    }
}
