//! Execution API handlers: start, inspect, resume and cancel executions.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::WorkflowExecution;
use crate::engine::WorkflowDefinition;
use crate::error::AppError;
use crate::state::AppState;
use crate::status::PauseStatusView;

/// Request to start an execution.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Workflow definition as JSON.
    #[serde(default)]
    pub definition: Option<serde_json::Value>,

    /// Workflow definition as YAML text, used when `definition` is absent.
    #[serde(default)]
    pub definition_yaml: Option<String>,

    #[serde(default)]
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeRequest {
    #[serde(default = "default_resume_reason")]
    pub reason: String,

    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn default_resume_reason() -> String {
    "manual resume".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub execution_id: String,
    pub cancelled: bool,
}

/// Start an execution and run it until it finishes or pauses.
///
/// POST /api/executions
pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<WorkflowExecution>), AppError> {
    let definition = match (request.definition, request.definition_yaml) {
        (Some(value), _) => WorkflowDefinition::from_json(value)?,
        (None, Some(yaml)) => WorkflowDefinition::from_yaml(&yaml)?,
        (None, None) => {
            return Err(AppError::Validation(
                "either definition or definition_yaml is required".to_string(),
            ))
        }
    };

    let execution = state.engine.start(&definition, request.input).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// Get execution details.
///
/// GET /api/executions/{execution_id}
pub async fn get(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution = state.engine.get_execution(&execution_id).await?;
    Ok(Json(execution))
}

/// Get the pause state of an execution.
///
/// GET /api/executions/{execution_id}/pause
pub async fn pause_status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<PauseStatusView>, AppError> {
    let view = state.status().get_pause_status(&execution_id).await?;
    Ok(Json(view))
}

/// Resume a paused execution.
///
/// POST /api/executions/{execution_id}/resume
pub async fn resume(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution = state
        .engine
        .resume(&execution_id, &request.reason, request.data)
        .await?;
    Ok(Json(execution))
}

/// Cancel a paused execution. Cancelling twice is not an error.
///
/// POST /api/executions/{execution_id}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    body: Bytes,
) -> Result<Json<CancelResponse>, AppError> {
    let request: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid cancel request: {}", e)))?
    };
    let cancelled = state
        .engine
        .cancel(&execution_id, request.reason.as_deref())
        .await?;
    Ok(Json(CancelResponse {
        execution_id,
        cancelled,
    }))
}
