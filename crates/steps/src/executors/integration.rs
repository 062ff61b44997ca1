//! Steps delegated to third-party integrations (AI providers, tools, external actions).
//!
//! The step layer only validates, resolves credentials and forwards an
//! [`IntegrationRequest`]; what a provider does with it is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::registry::StepExecutor;
use crate::result::ExecutionResult;

/// Request forwarded to an integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRequest {
    /// Step kind that issued the request (`ai`, `tool`, `external_action`).
    pub kind: String,
    pub provider: String,
    /// The prompt, tool name or action, depending on `kind`.
    pub operation: String,
    pub parameters: JsonMap,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub execution_id: String,
    pub step_id: String,
}

/// A third-party integration.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Provider name steps refer to (e.g. "openai", "github").
    fn provider(&self) -> &str;

    async fn invoke(&self, request: IntegrationRequest) -> Result<Value, StepError>;
}

/// Credential/OAuth collaborator.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A valid token for `(user_id, provider)`, or `None`.
    async fn token(&self, user_id: &str, provider: &str) -> Result<Option<String>, StepError>;
}

/// Integrations and the credential provider they share.
#[derive(Clone, Default)]
pub struct IntegrationSet {
    providers: HashMap<String, Arc<dyn Integration>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl IntegrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.providers
            .insert(integration.provider().to_string(), integration);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn Integration>> {
        self.providers.get(provider)
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for IntegrationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationSet")
            .field("providers", &self.providers())
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

/// Executor shared by the `ai`, `tool` and `external_action` step kinds.
#[derive(Clone, Debug)]
pub struct IntegrationExecutor {
    kind: &'static str,
    operation_param: &'static str,
    integrations: IntegrationSet,
}

impl IntegrationExecutor {
    pub fn ai(integrations: IntegrationSet) -> Self {
        Self {
            kind: "ai",
            operation_param: "prompt",
            integrations,
        }
    }

    pub fn tool(integrations: IntegrationSet) -> Self {
        Self {
            kind: "tool",
            operation_param: "tool_name",
            integrations,
        }
    }

    pub fn external_action(integrations: IntegrationSet) -> Self {
        Self {
            kind: "external_action",
            operation_param: "action",
            integrations,
        }
    }

    async fn resolve_token(
        &self,
        ctx: &ExecutionContext,
        provider: &str,
    ) -> Result<Option<String>, StepError> {
        if ctx.credential_ref(provider).is_none() {
            return Ok(None);
        }

        let credentials = self.integrations.credentials.as_ref().ok_or_else(|| {
            StepError::Collaborator(format!(
                "step references credentials for '{}' but no credential provider is configured",
                provider
            ))
        })?;
        let user_id = ctx.user_id().ok_or_else(|| {
            StepError::Collaborator("credential lookup requires 'user_id' in static data".into())
        })?;

        match credentials.token(user_id, provider).await? {
            Some(token) => Ok(Some(token)),
            None => Err(StepError::Collaborator(format!(
                "no valid token for provider '{}'",
                provider
            ))),
        }
    }
}

#[async_trait]
impl StepExecutor for IntegrationExecutor {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        let provider = ctx
            .param_str("provider")
            .ok_or_else(|| StepError::Validation("missing required parameter 'provider'".into()))?;
        if self.integrations.get(provider).is_none() {
            return Err(StepError::Validation(format!(
                "no integration registered for provider '{}'",
                provider
            )));
        }
        if ctx.param_str(self.operation_param).is_none() {
            return Err(StepError::Validation(format!(
                "missing required parameter '{}'",
                self.operation_param
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        let provider = ctx.param_str("provider").unwrap_or_default();
        let integration = self.integrations.get(provider).ok_or_else(|| {
            StepError::Collaborator(format!("integration '{}' disappeared", provider))
        })?;

        let token = self.resolve_token(ctx, provider).await?;
        let request = IntegrationRequest {
            kind: self.kind.to_string(),
            provider: provider.to_string(),
            operation: ctx.param_str(self.operation_param).unwrap_or_default().to_string(),
            parameters: ctx.parameters.clone(),
            input: ctx.input_data.clone(),
            token,
            execution_id: ctx.execution_id.clone(),
            step_id: ctx.step_id.clone(),
        };

        let output = integration.invoke(request).await?;
        Ok(ExecutionResult::success(output)
            .with_metadata("provider", Value::String(provider.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StepRunner;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Integration for Echo {
        fn provider(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, request: IntegrationRequest) -> Result<Value, StepError> {
            Ok(json!({
                "operation": request.operation,
                "token": request.token,
                "kind": request.kind,
            }))
        }
    }

    struct Tokens;

    #[async_trait]
    impl CredentialProvider for Tokens {
        async fn token(&self, user_id: &str, provider: &str) -> Result<Option<String>, StepError> {
            Ok((user_id == "u1").then(|| format!("tok-{}", provider)))
        }
    }

    fn set() -> IntegrationSet {
        IntegrationSet::new()
            .with_integration(Arc::new(Echo))
            .with_credentials(Arc::new(Tokens))
    }

    fn ctx(kind: &str, params: Value) -> ExecutionContext {
        ExecutionContext::new("wf", "ex", "call")
            .with_kind(kind, None)
            .with_parameters(params)
    }

    #[tokio::test]
    async fn test_ai_forwards_prompt() {
        let executor = IntegrationExecutor::ai(set());
        let result = StepRunner::default()
            .run(&executor, &ctx("ai", json!({"provider": "echo", "prompt": "summarize"})))
            .await;

        assert!(result.is_success());
        assert_eq!(result.output_data["operation"], json!("summarize"));
        assert_eq!(result.output_data["token"], json!(null));
        assert_eq!(result.metadata["provider"], json!("echo"));
    }

    #[tokio::test]
    async fn test_credentials_resolved_for_user() {
        let executor = IntegrationExecutor::external_action(set());
        let mut creds = HashMap::new();
        creds.insert("echo".to_string(), "cred-1".to_string());
        let mut static_data = JsonMap::new();
        static_data.insert("user_id".into(), json!("u1"));

        let ctx = ctx("external_action", json!({"provider": "echo", "action": "create_issue"}))
            .with_credentials(creds.clone())
            .with_static_data(static_data);
        let result = StepRunner::default().run(&executor, &ctx).await;
        assert_eq!(result.output_data["token"], json!("tok-echo"));

        let mut other_user = JsonMap::new();
        other_user.insert("user_id".into(), json!("u2"));
        let ctx = ctx.with_static_data(other_user);
        let result = StepRunner::default().run(&executor, &ctx).await;
        assert!(result.is_error());
        assert_eq!(result.error_details.unwrap()["error_type"], json!("CollaboratorError"));
    }

    #[tokio::test]
    async fn test_validation() {
        let executor = IntegrationExecutor::tool(set());
        let runner = StepRunner::default();

        let unknown = runner
            .run(&executor, &ctx("tool", json!({"provider": "nope", "tool_name": "x"})))
            .await;
        assert!(unknown.is_error());

        let missing_op = runner
            .run(&executor, &ctx("tool", json!({"provider": "echo"})))
            .await;
        assert!(missing_op.is_error());
    }
}
