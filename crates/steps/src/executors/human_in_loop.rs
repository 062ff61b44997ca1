//! Human-in-the-loop steps: suspend the execution until a person responds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::registry::StepExecutor;
use crate::result::{
    ExecutionResult, InteractionSpec, InteractionType, PauseRequest, TimeoutAction,
    MAX_TIMEOUT_HOURS,
};

/// Human-in-the-loop step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInLoopConfig {
    /// Interaction type when the step carries no sub-kind.
    #[serde(default)]
    pub interaction_type: Option<String>,

    /// Message shown to the responder.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    /// Notification channel (default: "log").
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Choices for selection interactions.
    #[serde(default)]
    pub options: Vec<Value>,

    /// Hours until the pause times out; the engine default applies when unset.
    #[serde(default)]
    pub timeout_hours: Option<f64>,

    /// What happens on timeout: continue, cancel or fail (default).
    #[serde(default)]
    pub timeout_action: Option<String>,

    /// Output used when a `continue` timeout fires.
    #[serde(default)]
    pub default_response: Option<Value>,

    /// Explicit resume conditions.
    #[serde(default)]
    pub resume_conditions: Option<JsonMap>,

    /// Approval interactions require `approved: true` unless disabled.
    #[serde(default = "default_require_approval")]
    pub require_approval: bool,
}

fn default_channel() -> String {
    "log".to_string()
}

fn default_require_approval() -> bool {
    true
}

/// Executor for the `human_in_loop` step kind.
#[derive(Debug, Clone, Default)]
pub struct HumanInLoopExecutor;

impl HumanInLoopExecutor {
    pub fn new() -> Self {
        Self
    }

    fn config(ctx: &ExecutionContext) -> Result<HumanInLoopConfig, StepError> {
        serde_json::from_value(Value::Object(ctx.parameters.clone()))
            .map_err(|e| StepError::Validation(format!("invalid human_in_loop parameters: {}", e)))
    }

    fn interaction_type(
        ctx: &ExecutionContext,
        config: &HumanInLoopConfig,
    ) -> Result<InteractionType, StepError> {
        ctx.subtype
            .as_deref()
            .or(config.interaction_type.as_deref())
            .unwrap_or("approval")
            .parse()
            .map_err(StepError::Validation)
    }

    fn timeout_action(config: &HumanInLoopConfig) -> Result<TimeoutAction, StepError> {
        match config.timeout_action.as_deref() {
            None => Ok(TimeoutAction::default()),
            Some(action) => action.parse().map_err(StepError::Validation),
        }
    }

    /// Build the suspension request from a validated configuration.
    pub fn pause_request(ctx: &ExecutionContext) -> Result<PauseRequest, StepError> {
        let config = Self::config(ctx)?;
        let interaction_type = Self::interaction_type(ctx, &config)?;
        let message = config.message.clone().unwrap_or_default();

        let resume_conditions = match config.resume_conditions.clone() {
            Some(conditions) => conditions,
            None if interaction_type == InteractionType::Approval && config.require_approval => {
                let mut conditions = JsonMap::new();
                conditions.insert("approved".into(), Value::Bool(true));
                conditions
            }
            None => JsonMap::new(),
        };

        Ok(PauseRequest {
            reason: format!("Awaiting {} on step '{}'", interaction_type.as_str(), ctx.step_id),
            resume_conditions,
            timeout_hours: config.timeout_hours,
            timeout_action: Self::timeout_action(&config)?,
            default_response: config.default_response.clone(),
            interaction: InteractionSpec {
                interaction_type,
                channel: config.channel.clone(),
                title: config
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Action required: {}", ctx.step_id)),
                message,
                options: config.options.clone(),
            },
        })
    }
}

#[async_trait]
impl StepExecutor for HumanInLoopExecutor {
    fn kind(&self) -> &'static str {
        "human_in_loop"
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        let config = Self::config(ctx)?;
        let interaction_type = Self::interaction_type(ctx, &config)?;

        if config.message.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(StepError::Validation("missing required parameter 'message'".into()));
        }
        if config.channel.trim().is_empty() {
            return Err(StepError::Validation("'channel' must not be empty".into()));
        }
        if interaction_type == InteractionType::Selection && config.options.is_empty() {
            return Err(StepError::Validation(
                "selection interactions require non-empty 'options'".into(),
            ));
        }
        if let Some(hours) = config.timeout_hours {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(StepError::Validation("'timeout_hours' must be positive".into()));
            }
            if hours > MAX_TIMEOUT_HOURS {
                return Err(StepError::Validation(format!(
                    "'timeout_hours' must not exceed {}",
                    MAX_TIMEOUT_HOURS
                )));
            }
        }
        Self::timeout_action(&config)?;
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        let request = Self::pause_request(ctx)?;

        tracing::info!(
            execution_id = %ctx.execution_id,
            step_id = %ctx.step_id,
            interaction_type = request.interaction.interaction_type.as_str(),
            channel = %request.interaction.channel,
            "Requesting human interaction"
        );

        let output = json!({
            "interaction_type": request.interaction.interaction_type,
            "channel": request.interaction.channel,
            "message": request.interaction.message,
            "status": "awaiting_response",
        });
        Ok(ExecutionResult::paused(request, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StepRunner;

    fn ctx(subtype: &str, params: Value) -> ExecutionContext {
        ExecutionContext::new("wf", "ex-1", "approve")
            .with_kind("human_in_loop", Some(subtype))
            .with_parameters(params)
    }

    #[tokio::test]
    async fn test_approval_pauses_with_default_conditions() {
        let ctx = ctx("approval", json!({"message": "Ship it?", "channel": "slack"}));
        let result = StepRunner::default().run(&HumanInLoopExecutor, &ctx).await;

        assert!(result.is_paused());
        let pause = result.pause.unwrap();
        assert_eq!(pause.resume_conditions.get("approved"), Some(&json!(true)));
        assert_eq!(pause.timeout_action, TimeoutAction::Fail);
        assert_eq!(pause.interaction.channel, "slack");
        assert_eq!(result.output_data["status"], json!("awaiting_response"));
    }

    #[tokio::test]
    async fn test_explicit_conditions_and_timeout_policy() {
        let ctx = ctx(
            "input",
            json!({
                "message": "Enter budget",
                "resume_conditions": {"budget": null},
                "timeout_hours": 0.5,
                "timeout_action": "continue",
                "default_response": {"budget": 0}
            }),
        );
        let result = StepRunner::default().run(&HumanInLoopExecutor, &ctx).await;

        let pause = result.pause.unwrap();
        assert_eq!(pause.resume_conditions.get("budget"), Some(&Value::Null));
        assert_eq!(pause.timeout_hours, Some(0.5));
        assert_eq!(pause.timeout_action, TimeoutAction::Continue);
        assert_eq!(pause.default_response, Some(json!({"budget": 0})));
        assert_eq!(pause.interaction.channel, "log");
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let cases = vec![
            ("approval", json!({})),
            ("selection", json!({"message": "Pick one"})),
            ("approval", json!({"message": "ok?", "timeout_hours": 0})),
            ("approval", json!({"message": "ok?", "timeout_hours": 1e10})),
            ("approval", json!({"message": "ok?", "timeout_hours": MAX_TIMEOUT_HOURS + 1.0})),
            ("approval", json!({"message": "ok?", "timeout_action": "explode"})),
            ("vote", json!({"message": "ok?"})),
        ];

        for (subtype, params) in cases {
            let result = StepRunner::default()
                .run(&HumanInLoopExecutor, &ctx(subtype, params.clone()))
                .await;
            assert!(result.is_error(), "expected validation error for {} {}", subtype, params);
        }
    }

    #[test]
    fn test_timeout_at_cap_is_accepted() {
        let ctx = ctx(
            "approval",
            json!({"message": "ok?", "timeout_hours": MAX_TIMEOUT_HOURS}),
        );
        assert!(HumanInLoopExecutor.validate_parameters(&ctx).is_ok());
    }

    #[tokio::test]
    async fn test_approval_without_requirement() {
        let ctx = ctx(
            "approval",
            json!({"message": "FYI", "require_approval": false}),
        );
        let request = HumanInLoopExecutor::pause_request(&ctx).unwrap();
        assert!(request.resume_conditions.is_empty());
    }
}
