//! The validate → execute → record-outcome wrapper every step goes through.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::observer::{ExecutionObserver, StepEvent, TracingObserver};
use crate::registry::StepExecutor;
use crate::result::{ExecutionResult, ExecutionStatus};

/// Runs step executors with fault isolation and observability.
///
/// A fault inside a step (an `Err`, or a panic) never propagates past
/// [`StepRunner::run`]; it becomes an Error result carrying the fault type.
#[derive(Clone)]
pub struct StepRunner {
    observer: Arc<dyn ExecutionObserver>,
}

impl Default for StepRunner {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl StepRunner {
    pub fn new(observer: Arc<dyn ExecutionObserver>) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &Arc<dyn ExecutionObserver> {
        &self.observer
    }

    /// Run one step invocation to a result.
    pub async fn run(&self, executor: &dyn StepExecutor, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        let step_kind = if ctx.kind.is_empty() {
            executor.kind().to_string()
        } else {
            ctx.kind.clone()
        };

        self.observer.on_step_start(&StepEvent {
            execution_id: ctx.execution_id.clone(),
            step_id: ctx.step_id.clone(),
            step_kind: step_kind.clone(),
            status: None,
            duration_ms: None,
            error: None,
        });

        let mut result = match validate(executor, ctx) {
            Err(err) => ExecutionResult::from_fault(&err),
            Ok(()) => match AssertUnwindSafe(executor.execute(ctx)).catch_unwind().await {
                Ok(Ok(result)) => check_outcome(result),
                Ok(Err(err)) => ExecutionResult::from_fault(&err),
                Err(panic) => panic_result(panic),
            },
        };

        result.execution_time_ms = start.elapsed().as_millis() as u64;

        self.observer.on_step_finish(&StepEvent {
            execution_id: ctx.execution_id.clone(),
            step_id: ctx.step_id.clone(),
            step_kind,
            status: Some(result.status),
            duration_ms: Some(result.execution_time_ms),
            error: result.error_message.clone(),
        });

        result
    }
}

fn validate(executor: &dyn StepExecutor, ctx: &ExecutionContext) -> Result<(), StepError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| executor.validate_parameters(ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(StepError::Validation(message))) => Err(StepError::Validation(message)),
        Ok(Err(other)) => Err(StepError::Validation(other.to_string())),
        Err(panic) => Err(StepError::Validation(format!(
            "parameter validation panicked: {}",
            panic_message(&panic)
        ))),
    }
}

/// Results must be terminal or paused, and a paused result must say how to pause.
fn check_outcome(result: ExecutionResult) -> ExecutionResult {
    match result.status {
        ExecutionStatus::Pending | ExecutionStatus::Running => ExecutionResult::from_fault(
            &StepError::Execution(format!("executor returned non-terminal status '{}'", result.status)),
        ),
        ExecutionStatus::Paused if result.pause.is_none() => ExecutionResult::from_fault(
            &StepError::Execution("paused result without a pause request".to_string()),
        ),
        _ => result,
    }
}

fn panic_result(panic: Box<dyn std::any::Any + Send>) -> ExecutionResult {
    let message = panic_message(&panic);
    ExecutionResult::error(format!("Step panicked: {}", message)).with_error_details(
        serde_json::json!({
            "error_type": "Panic",
            "message": message,
        }),
    )
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
