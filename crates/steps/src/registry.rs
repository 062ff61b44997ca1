//! Step executor registry and dispatch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::result::ExecutionResult;

/// Capability every step kind implements.
///
/// Executors are stateless beyond their own configuration; everything about
/// the invocation comes in through the [`ExecutionContext`].
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// The step kind this executor handles (e.g. "flow", "trigger").
    fn kind(&self) -> &'static str;

    /// Check the step parameters before any business logic runs.
    ///
    /// `Err(StepError::Validation(message))` ends the step as Error without
    /// calling [`StepExecutor::execute`].
    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError>;

    /// Run the step.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError>;
}

/// Builds a fresh executor for one invocation.
pub type Constructor = Arc<dyn Fn() -> Box<dyn StepExecutor> + Send + Sync>;

/// Registry mapping step kinds to executor constructors.
///
/// Built once at startup and shared read-only afterwards; there is no global
/// instance.
#[derive(Clone, Default)]
pub struct StepRegistry {
    constructors: HashMap<String, Constructor>,
}

impl StepRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor for a step kind, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn StepExecutor> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!(step_kind = %kind, "Registered step executor");
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Register a cloneable executor instance under its own kind.
    pub fn register_executor<E>(&mut self, executor: E)
    where
        E: StepExecutor + Clone + 'static,
    {
        let kind = executor.kind();
        self.register(kind, move || Box::new(executor.clone()));
    }

    /// Create an executor for a step kind.
    pub fn create_executor(&self, kind: &str) -> Result<Box<dyn StepExecutor>, StepError> {
        self.constructors
            .get(kind)
            .map(|ctor| ctor())
            .ok_or_else(|| StepError::UnknownStepKind(kind.to_string()))
    }

    /// Check if a kind is registered.
    pub fn has(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// List all registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct EchoStep;

    #[async_trait]
    impl StepExecutor for EchoStep {
        fn kind(&self) -> &'static str {
            "echo"
        }

        fn validate_parameters(&self, _ctx: &ExecutionContext) -> Result<(), StepError> {
            Ok(())
        }

        async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
            Ok(ExecutionResult::success(ctx.input_data.clone()))
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = StepRegistry::new();
        assert!(registry.kinds().is_empty());
    }

    #[test]
    fn test_registry_register() {
        let mut registry = StepRegistry::new();
        registry.register_executor(EchoStep);
        registry.register("alias", || Box::new(EchoStep));

        assert!(registry.has("echo"));
        assert!(!registry.has("unknown"));
        assert_eq!(registry.kinds(), vec!["alias", "echo"]);
    }

    #[tokio::test]
    async fn test_registry_create_and_execute() {
        let mut registry = StepRegistry::new();
        registry.register_executor(EchoStep);

        let executor = registry.create_executor("echo").unwrap();
        let ctx = ExecutionContext::new("wf", "ex", "s").with_input(serde_json::json!({"x": 1}));
        let result = executor.execute(&ctx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output_value(), serde_json::json!({"x": 1}));
    }

    #[test]
    fn test_registry_constructs_fresh_executor_per_call() {
        let mut registry = StepRegistry::new();
        registry.register_executor(EchoStep);
        let shared = Arc::new(registry);

        let outputs: Vec<_> = (0..3)
            .map(|i| {
                let executor = shared.create_executor("echo").unwrap();
                let ctx = ExecutionContext::new("wf", "ex", "s").with_input(serde_json::json!({"n": i}));
                tokio_test::block_on(executor.execute(&ctx)).unwrap().output_value()
            })
            .collect();
        assert_eq!(
            outputs,
            vec![
                serde_json::json!({"n": 0}),
                serde_json::json!({"n": 1}),
                serde_json::json!({"n": 2})
            ]
        );
    }

    #[test]
    fn test_registry_unknown_kind() {
        let registry = StepRegistry::new();
        let result = registry.create_executor("teleport");
        assert!(matches!(result, Err(StepError::UnknownStepKind(k)) if k == "teleport"));
    }
}
