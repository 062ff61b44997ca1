//! Step execution error types.

use thiserror::Error;

/// Errors that can occur while resolving or running a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// No executor registered for the step kind.
    #[error("Unknown step kind: {0}")]
    UnknownStepKind(String),

    /// Step parameters failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Business logic inside `execute` failed.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Condition or expression could not be evaluated.
    #[error("Expression error: {0}")]
    Expression(String),

    /// An external collaborator (integration, credential store, memory) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl StepError {
    /// Stable name of the error variant, recorded as the fault type in error results.
    pub fn type_name(&self) -> &'static str {
        match self {
            StepError::UnknownStepKind(_) => "UnknownStepKind",
            StepError::Validation(_) => "ValidationError",
            StepError::Execution(_) => "BusinessLogicError",
            StepError::Expression(_) => "ConditionEvaluationError",
            StepError::Collaborator(_) => "CollaboratorError",
            StepError::Json(_) => "JsonError",
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Json(e.to_string())
    }
}
