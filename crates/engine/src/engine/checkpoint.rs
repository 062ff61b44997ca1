//! Per-execution progress, stored on the execution row.
//!
//! A checkpoint holds the outcome of every step that has finished, so an
//! execution can continue from its paused step after a restart. Edge
//! activation is derived from the recorded routes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weft_steps::{ExecutionResult, ExecutionStatus, Route};

use super::graph::EdgeDefinition;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub route: Route,
}

impl StepRecord {
    pub fn from_result(result: &ExecutionResult) -> Self {
        Self {
            status: result.status,
            output: result.output_value(),
            error: result.error_message.clone(),
            route: result.route.clone(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            output: serde_json::Value::Null,
            error: None,
            route: Route::Halt,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: serde_json::Value::Null,
            error: Some(message.into()),
            route: Route::Halt,
        }
    }

    /// Whether this record lets `edge` carry data.
    pub fn activates(&self, edge: &EdgeDefinition) -> bool {
        if self.status != ExecutionStatus::Success {
            return false;
        }
        match &self.route {
            Route::All => true,
            Route::Paths(paths) => paths.iter().any(|p| p == edge.path_name()),
            Route::Halt => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_step: Option<String>,
}

impl Checkpoint {
    pub fn from_value(value: &serde_json::Value) -> AppResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| AppError::Internal(format!("Corrupt checkpoint: {}", e)))
    }

    pub fn to_value(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn get(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    pub fn record(&mut self, step_id: impl Into<String>, record: StepRecord) {
        self.steps.insert(step_id.into(), record);
    }

    pub fn edge_active(&self, edge: &EdgeDefinition) -> bool {
        self.get(&edge.source)
            .map(|r| r.activates(edge))
            .unwrap_or(false)
    }

    /// Complete the paused step with `output`, following all of its edges.
    pub fn complete_paused(&mut self, step_id: &str, output: serde_json::Value) -> AppResult<()> {
        match self.steps.get(step_id) {
            Some(record) if record.status == ExecutionStatus::Paused => {}
            _ => {
                return Err(AppError::Conflict(format!(
                    "step '{}' is not paused",
                    step_id
                )))
            }
        }

        self.record(
            step_id,
            StepRecord {
                status: ExecutionStatus::Success,
                output,
                error: None,
                route: Route::All,
            },
        );
        self.paused_step = None;
        Ok(())
    }

    /// First failed step and its error, in step id order.
    pub fn first_error(&self) -> Option<(&str, &str)> {
        self.steps
            .iter()
            .find(|(_, r)| r.status == ExecutionStatus::Error)
            .map(|(id, r)| (id.as_str(), r.error.as_deref().unwrap_or("step failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge(source: &str, target: &str, branch: Option<&str>) -> EdgeDefinition {
        EdgeDefinition {
            source: source.to_string(),
            target: target.to_string(),
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn test_route_activation() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.record(
            "check",
            StepRecord::from_result(
                &ExecutionResult::success(json!({})).with_route(Route::path("true")),
            ),
        );
        checkpoint.record("broken", StepRecord::failed("boom"));

        assert!(checkpoint.edge_active(&edge("check", "big", Some("true"))));
        assert!(!checkpoint.edge_active(&edge("check", "small", Some("false"))));
        assert!(!checkpoint.edge_active(&edge("check", "true_target", None)));
        assert!(!checkpoint.edge_active(&edge("broken", "next", None)));
        assert!(!checkpoint.edge_active(&edge("missing", "next", None)));
        assert_eq!(checkpoint.first_error(), Some(("broken", "boom")));
    }

    #[test]
    fn test_complete_paused_step() {
        let mut checkpoint = Checkpoint::default();
        let mut record = StepRecord::skipped();
        record.status = ExecutionStatus::Paused;
        checkpoint.record("approve", record);
        checkpoint.paused_step = Some("approve".to_string());

        let value = checkpoint.to_value().unwrap();
        let mut restored = Checkpoint::from_value(&value).unwrap();
        assert_eq!(restored, checkpoint);

        restored
            .complete_paused("approve", json!({"approved": true}))
            .unwrap();
        assert!(restored.paused_step.is_none());
        assert!(restored.edge_active(&edge("approve", "ship", None)));
        assert!(restored.complete_paused("approve", json!({})).is_err());
    }

    #[test]
    fn test_empty_value_is_empty_checkpoint() {
        assert_eq!(Checkpoint::from_value(&json!({})).unwrap(), Checkpoint::default());
        assert_eq!(
            Checkpoint::from_value(&serde_json::Value::Null).unwrap(),
            Checkpoint::default()
        );
    }
}
