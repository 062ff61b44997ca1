//! Pause record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, types::Json, FromRow, Row};
use weft_steps::{JsonMap, TimeoutAction};

use super::WorkflowStatus;

/// Lifecycle of a pause record. Only `Active` can transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseStatus {
    Active,
    Resumed,
    Cancelled,
    Timeout,
}

impl PauseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseStatus::Active => "active",
            PauseStatus::Resumed => "resumed",
            PauseStatus::Cancelled => "cancelled",
            PauseStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for PauseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PauseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PauseStatus::Active),
            "resumed" => Ok(PauseStatus::Resumed),
            "cancelled" => Ok(PauseStatus::Cancelled),
            "timeout" => Ok(PauseStatus::Timeout),
            other => Err(format!("unknown pause status '{}'", other)),
        }
    }
}

/// Durable record of a suspended execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRecord {
    pub id: String,
    pub execution_id: String,
    pub paused_step_id: String,
    pub pause_reason: String,
    pub resume_conditions: JsonMap,
    pub status: PauseStatus,
    pub timeout_at: DateTime<Utc>,
    pub timeout_action: TimeoutAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PauseRecord {
    pub fn is_active(&self) -> bool {
        self.status == PauseStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.timeout_at <= now
    }
}

impl<'r> FromRow<'r, PgRow> for PauseRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let timeout_action: String = row.try_get("timeout_action")?;
        let Json(resume_conditions): Json<JsonMap> = row.try_get("resume_conditions")?;

        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            paused_step_id: row.try_get("paused_step_id")?,
            pause_reason: row.try_get("pause_reason")?,
            resume_conditions,
            status: status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            timeout_at: row.try_get("timeout_at")?,
            timeout_action: timeout_action
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            default_response: row.try_get("default_response")?,
            resume_reason: row.try_get("resume_reason")?,
            resume_data: row.try_get("resume_data")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

/// A conditional move of the active pause of an execution to a terminal state,
/// applied together with the execution status change.
#[derive(Debug, Clone)]
pub struct PauseTransition {
    pub pause_status: PauseStatus,
    pub execution_status: WorkflowStatus,
    pub reason: Option<String>,
    pub resume_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Only transition if the active pause is this one.
    pub expected_pause_id: Option<String>,
}

impl PauseTransition {
    pub fn new(pause_status: PauseStatus, execution_status: WorkflowStatus) -> Self {
        Self {
            pause_status,
            execution_status,
            reason: None,
            resume_data: None,
            error_message: None,
            expected_pause_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_resume_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.resume_data = data;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn expecting(mut self, pause_id: impl Into<String>) -> Self {
        self.expected_pause_id = Some(pause_id.into());
        self
    }
}
