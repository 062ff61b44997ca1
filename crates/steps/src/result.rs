//! Step execution result types.

use serde::{Deserialize, Serialize};

use crate::context::JsonMap;
use crate::error::StepError;

/// Status of a step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
    Cancelled,
    Paused,
}

impl ExecutionStatus {
    /// Returns true once the step can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Error
                | ExecutionStatus::Skipped
                | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which outgoing edges of a step the engine should follow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "paths", rename_all = "snake_case")]
pub enum Route {
    /// Follow every outgoing edge.
    #[default]
    All,
    /// Follow only edges whose branch label (or target id) is listed.
    Paths(Vec<String>),
    /// Follow nothing.
    Halt,
}

impl Route {
    /// Route to a single named path.
    pub fn path(name: impl Into<String>) -> Self {
        Route::Paths(vec![name.into()])
    }
}

/// Kind of human interaction a suspended step waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Approval,
    Input,
    Selection,
    Review,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Approval => "approval",
            InteractionType::Input => "input",
            InteractionType::Selection => "selection",
            InteractionType::Review => "review",
        }
    }
}

impl std::str::FromStr for InteractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approval" => Ok(InteractionType::Approval),
            "input" => Ok(InteractionType::Input),
            "selection" => Ok(InteractionType::Selection),
            "review" => Ok(InteractionType::Review),
            other => Err(format!("Unknown interaction type: {}", other)),
        }
    }
}

/// What the timeout monitor does once a pause deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    /// Resume with the default (or a synthesized) response.
    Continue,
    /// Cancel the execution.
    Cancel,
    /// Fail the execution.
    #[default]
    Fail,
}

impl TimeoutAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutAction::Continue => "continue",
            TimeoutAction::Cancel => "cancel",
            TimeoutAction::Fail => "fail",
        }
    }
}

impl std::str::FromStr for TimeoutAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(TimeoutAction::Continue),
            "cancel" => Ok(TimeoutAction::Cancel),
            "fail" => Ok(TimeoutAction::Fail),
            other => Err(format!("Unknown timeout action: {}", other)),
        }
    }
}

/// The human-facing part of a suspension request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSpec {
    pub interaction_type: InteractionType,

    /// Notification channel name (e.g. `slack`, `email`, `log`).
    pub channel: String,

    pub title: String,

    pub message: String,

    /// Choices offered for selection interactions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,
}

/// Request from a step to suspend the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseRequest {
    pub reason: String,

    /// Key/expected-value pairs the resume data must satisfy.
    /// A `null` expected value only requires the key to be present.
    #[serde(default)]
    pub resume_conditions: JsonMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<f64>,

    #[serde(default)]
    pub timeout_action: TimeoutAction,

    /// Payload used as the step output when a `continue` timeout fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_response: Option<serde_json::Value>,

    pub interaction: InteractionSpec,
}

/// Result of one step invocation. Produced exactly once per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,

    #[serde(default)]
    pub output_data: JsonMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,

    /// Wall time spent in the lifecycle wrapper, in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,

    #[serde(default)]
    pub metadata: JsonMap,

    #[serde(default)]
    pub route: Route,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseRequest>,
}

impl ExecutionResult {
    fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            output_data: JsonMap::new(),
            error_message: None,
            error_details: None,
            execution_time_ms: 0,
            metadata: JsonMap::new(),
            route: Route::All,
            pause: None,
        }
    }

    /// Create a successful result. Non-object outputs are stored under `result`.
    pub fn success(output: serde_json::Value) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Success);
        result.output_data = into_map(output);
        result
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Error);
        result.error_message = Some(message.into());
        result
    }

    /// Create an error result from a step fault, recording its type.
    pub fn from_fault(err: &StepError) -> Self {
        Self::error(err.to_string()).with_error_details(serde_json::json!({
            "error_type": err.type_name(),
            "message": err.to_string(),
        }))
    }

    /// Create a skipped result.
    pub fn skipped(reason: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Skipped);
        result.route = Route::Halt;
        result
            .metadata
            .insert("skip_reason".into(), serde_json::Value::String(reason.into()));
        result
    }

    /// Create a paused result carrying the suspension request.
    pub fn paused(request: PauseRequest, output: serde_json::Value) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Paused);
        result.output_data = into_map(output);
        result.route = Route::Halt;
        result.pause = Some(request);
        result
    }

    /// Create a cancelled result.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        let mut result = Self::with_status(ExecutionStatus::Cancelled);
        result.route = Route::Halt;
        result.error_message = Some(reason.into());
        result
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn with_error_details(mut self, details: serde_json::Value) -> Self {
        self.error_details = Some(details);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.execution_time_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ExecutionStatus::Error
    }

    pub fn is_paused(&self) -> bool {
        self.status == ExecutionStatus::Paused
    }

    /// Output data as a JSON value.
    pub fn output_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.output_data.clone())
    }
}

/// Longest pause timeout accepted, in hours (100 years).
pub const MAX_TIMEOUT_HOURS: f64 = 876_000.0;

/// Key a non-object output is stored under in `output_data`.
pub const RESULT_KEY: &str = "result";

fn into_map(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => JsonMap::new(),
        other => {
            let mut map = JsonMap::new();
            map.insert(RESULT_KEY.into(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Success.to_string(), "success");
        assert_eq!(ExecutionStatus::Paused.to_string(), "paused");
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_success_wraps_scalars() {
        let result = ExecutionResult::success(json!(42));
        assert!(result.is_success());
        assert_eq!(result.output_data.get("result"), Some(&json!(42)));

        let result = ExecutionResult::success(json!({"a": 1}));
        assert_eq!(result.output_value(), json!({"a": 1}));
    }

    #[test]
    fn test_from_fault_records_type() {
        let result = ExecutionResult::from_fault(&StepError::Execution("boom".into()));
        assert!(result.is_error());
        assert_eq!(result.error_message.as_deref(), Some("Execution failed: boom"));
        assert_eq!(
            result.error_details.unwrap()["error_type"],
            json!("BusinessLogicError")
        );
    }

    #[test]
    fn test_route_serialization() {
        let json = serde_json::to_value(Route::path("approved")).unwrap();
        assert_eq!(json, json!({"type": "paths", "paths": ["approved"]}));
        let json = serde_json::to_value(Route::All).unwrap();
        assert_eq!(json, json!({"type": "all"}));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Approval".parse::<InteractionType>(), Ok(InteractionType::Approval));
        assert!("vote".parse::<InteractionType>().is_err());
        assert_eq!("cancel".parse::<TimeoutAction>(), Ok(TimeoutAction::Cancel));
        assert_eq!(TimeoutAction::default(), TimeoutAction::Fail);
    }
}
