//! Workflow memory steps backed by a pluggable key/value store.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::registry::StepExecutor;
use crate::result::ExecutionResult;

/// Default number of entries a `buffer` memory keeps.
pub const DEFAULT_WINDOW_SIZE: u64 = 10;

/// Storage collaborator for memory steps.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StepError>;

    async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<(), StepError>;
}

/// Process-local memory backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StepError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<(), StepError> {
        let mut entries = self.entries.write().await;
        entries.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}

/// Executor for the `memory` step kind (`store`, `retrieve`, `buffer`).
///
/// Entries are namespaced by workflow id.
#[derive(Clone)]
pub struct MemoryExecutor {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryExecutor {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    fn operation(ctx: &ExecutionContext) -> &str {
        ctx.subtype
            .as_deref()
            .or_else(|| ctx.param_str("operation"))
            .unwrap_or("store")
    }
}

#[async_trait]
impl StepExecutor for MemoryExecutor {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn validate_parameters(&self, ctx: &ExecutionContext) -> Result<(), StepError> {
        if ctx.param_str("key").is_none() {
            return Err(StepError::Validation("missing required parameter 'key'".into()));
        }
        match Self::operation(ctx) {
            "store" | "retrieve" => Ok(()),
            "buffer" => match ctx.param("window_size") {
                None => Ok(()),
                Some(_) => match ctx.param_u64("window_size") {
                    Some(size) if size > 0 => Ok(()),
                    _ => Err(StepError::Validation(
                        "'window_size' must be a positive integer".into(),
                    )),
                },
            },
            other => Err(StepError::Validation(format!(
                "unknown memory operation '{}'",
                other
            ))),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
        let key = ctx.param_str("key").unwrap_or_default();
        let namespace = ctx.workflow_id.as_str();

        let output = match Self::operation(ctx) {
            "retrieve" => {
                let value = self.backend.get(namespace, key).await?;
                let found = value.is_some();
                let value = value
                    .or_else(|| ctx.param("default").cloned())
                    .unwrap_or(Value::Null);
                json!({"key": key, "value": value, "found": found})
            }
            "buffer" => {
                let window = ctx.param_u64("window_size").unwrap_or(DEFAULT_WINDOW_SIZE) as usize;
                let mut buffer = match self.backend.get(namespace, key).await? {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                buffer.push(ctx.input_data.clone());
                if buffer.len() > window {
                    buffer.drain(..buffer.len() - window);
                }
                let size = buffer.len();
                self.backend
                    .put(namespace, key, Value::Array(buffer.clone()))
                    .await?;
                json!({"key": key, "buffer": buffer, "size": size})
            }
            _ => {
                let value = ctx
                    .param("value")
                    .cloned()
                    .unwrap_or_else(|| ctx.input_data.clone());
                self.backend.put(namespace, key, value).await?;
                json!({"key": key, "stored": true})
            }
        };

        tracing::debug!(
            execution_id = %ctx.execution_id,
            step_id = %ctx.step_id,
            key = %key,
            operation = Self::operation(ctx),
            "Memory step completed"
        );

        Ok(ExecutionResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StepRunner;

    fn ctx(op: &str, params: Value, input: Value) -> ExecutionContext {
        ExecutionContext::new("wf-mem", "ex", "mem")
            .with_kind("memory", Some(op))
            .with_parameters(params)
            .with_input(input)
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let executor = MemoryExecutor::new(Arc::new(InMemoryBackend::new()));
        let runner = StepRunner::default();

        let stored = runner
            .run(&executor, &ctx("store", json!({"key": "last"}), json!({"n": 1})))
            .await;
        assert!(stored.is_success());

        let fetched = runner
            .run(&executor, &ctx("retrieve", json!({"key": "last"}), Value::Null))
            .await;
        assert_eq!(fetched.output_data["value"], json!({"n": 1}));
        assert_eq!(fetched.output_data["found"], json!(true));

        let missing = runner
            .run(
                &executor,
                &ctx("retrieve", json!({"key": "other", "default": 0}), Value::Null),
            )
            .await;
        assert_eq!(missing.output_data["value"], json!(0));
        assert_eq!(missing.output_data["found"], json!(false));
    }

    #[tokio::test]
    async fn test_buffer_keeps_window() {
        let executor = MemoryExecutor::new(Arc::new(InMemoryBackend::new()));
        let runner = StepRunner::default();

        let mut last = None;
        for i in 0..5 {
            last = Some(
                runner
                    .run(
                        &executor,
                        &ctx("buffer", json!({"key": "recent", "window_size": 3}), json!(i)),
                    )
                    .await,
            );
        }
        let last = last.unwrap();
        assert_eq!(last.output_data["buffer"], json!([2, 3, 4]));
        assert_eq!(last.output_data["size"], json!(3));
    }

    #[tokio::test]
    async fn test_namespaced_by_workflow() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.put("wf-a", "k", json!(1)).await.unwrap();
        assert_eq!(backend.get("wf-b", "k").await.unwrap(), None);
        assert_eq!(backend.get("wf-a", "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_key_required() {
        let executor = MemoryExecutor::new(Arc::new(InMemoryBackend::new()));
        let result = StepRunner::default()
            .run(&executor, &ctx("store", json!({}), Value::Null))
            .await;
        assert!(result.is_error());
    }
}
