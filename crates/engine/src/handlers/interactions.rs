//! External response handler for human interactions.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::db::models::WorkflowExecution;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    /// Response data; becomes the paused step's output.
    pub response: serde_json::Value,

    #[serde(default)]
    pub responder: Option<String>,
}

/// Respond to a pending interaction and resume its execution.
///
/// POST /api/interactions/{interaction_id}/respond
pub async fn respond(
    State(state): State<AppState>,
    Path(interaction_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution = state
        .engine
        .respond(&interaction_id, request.response, request.responder.as_deref())
        .await?;
    Ok(Json(execution))
}
