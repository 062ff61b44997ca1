//! Observability hooks for step and execution lifecycle events.

use serde::{Deserialize, Serialize};

use crate::result::ExecutionStatus;

/// Emitted by the lifecycle wrapper around every step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    pub execution_id: String,
    pub step_id: String,
    pub step_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pause-related lifecycle transitions of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Paused,
    Resumed,
    TimedOut,
    Cancelled,
    TimeoutWarning,
}

impl std::fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleKind::Paused => "paused",
            LifecycleKind::Resumed => "resumed",
            LifecycleKind::TimedOut => "timed_out",
            LifecycleKind::Cancelled => "cancelled",
            LifecycleKind::TimeoutWarning => "timeout_warning",
        };
        f.write_str(s)
    }
}

/// An execution lifecycle event (pause/resume/timeout/cancel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, execution_id: impl Into<String>) -> Self {
        Self {
            kind,
            execution_id: execution_id.into(),
            step_id: None,
            reason: None,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Receives observability events. Implementations must not fail or block for long;
/// outcomes never depend on them.
pub trait ExecutionObserver: Send + Sync {
    fn on_step_start(&self, event: &StepEvent);

    fn on_step_finish(&self, event: &StepEvent);

    fn on_lifecycle(&self, event: &LifecycleEvent);
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_step_start(&self, event: &StepEvent) {
        tracing::debug!(
            target: "weft.observability",
            execution_id = %event.execution_id,
            step_id = %event.step_id,
            step_kind = %event.step_kind,
            "Step started"
        );
    }

    fn on_step_finish(&self, event: &StepEvent) {
        let status = event.status.map(|s| s.as_str()).unwrap_or("unknown");
        if event.error.is_some() {
            tracing::warn!(
                target: "weft.observability",
                execution_id = %event.execution_id,
                step_id = %event.step_id,
                step_kind = %event.step_kind,
                status,
                duration_ms = event.duration_ms.unwrap_or(0),
                error = event.error.as_deref().unwrap_or(""),
                "Step finished with error"
            );
        } else {
            tracing::info!(
                target: "weft.observability",
                execution_id = %event.execution_id,
                step_id = %event.step_id,
                step_kind = %event.step_kind,
                status,
                duration_ms = event.duration_ms.unwrap_or(0),
                "Step finished"
            );
        }
    }

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        tracing::info!(
            target: "weft.observability",
            execution_id = %event.execution_id,
            step_id = event.step_id.as_deref().unwrap_or(""),
            event = %event.kind,
            reason = event.reason.as_deref().unwrap_or(""),
            "Execution lifecycle event"
        );
    }
}

/// Observer that keeps every event in memory. Useful in tests and embedders.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    steps: std::sync::Mutex<Vec<StepEvent>>,
    lifecycle: std::sync::Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step events recorded so far (starts and finishes, in order).
    pub fn step_events(&self) -> Vec<StepEvent> {
        self.steps.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Lifecycle events recorded so far.
    pub fn lifecycle_events(&self) -> Vec<LifecycleEvent> {
        self.lifecycle.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Lifecycle event kinds recorded so far.
    pub fn lifecycle_kinds(&self) -> Vec<LifecycleKind> {
        self.lifecycle_events().iter().map(|e| e.kind).collect()
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_step_start(&self, event: &StepEvent) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(event.clone());
        }
    }

    fn on_step_finish(&self, event: &StepEvent) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(event.clone());
        }
    }

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        if let Ok(mut lifecycle) = self.lifecycle.lock() {
            lifecycle.push(event.clone());
        }
    }
}
