//! Human interaction request model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, types::Json, FromRow, Row};
use weft_steps::InteractionType;

use super::PauseStatus;

/// Interaction lifecycle: `pending -> {resumed | cancelled | timeout}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionStatus {
    Pending,
    Resumed,
    Cancelled,
    Timeout,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Pending => "pending",
            InteractionStatus::Resumed => "resumed",
            InteractionStatus::Cancelled => "cancelled",
            InteractionStatus::Timeout => "timeout",
        }
    }

    /// The interaction status that mirrors a resolved pause.
    pub fn following(pause: PauseStatus) -> Self {
        match pause {
            PauseStatus::Active => InteractionStatus::Pending,
            PauseStatus::Resumed => InteractionStatus::Resumed,
            PauseStatus::Cancelled => InteractionStatus::Cancelled,
            PauseStatus::Timeout => InteractionStatus::Timeout,
        }
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InteractionStatus::Pending),
            "resumed" => Ok(InteractionStatus::Resumed),
            "cancelled" => Ok(InteractionStatus::Cancelled),
            "timeout" => Ok(InteractionStatus::Timeout),
            other => Err(format!("unknown interaction status '{}'", other)),
        }
    }
}

/// A request for a human response, tied to one pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub execution_id: String,
    pub step_id: String,
    pub pause_id: String,
    pub interaction_type: InteractionType,
    pub channel: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,
    pub status: InteractionStatus,
    pub expires_at: DateTime<Utc>,
    pub warning_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for Interaction {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let interaction_type: String = row.try_get("interaction_type")?;
        let Json(options): Json<Vec<serde_json::Value>> = row.try_get("options")?;

        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            pause_id: row.try_get("pause_id")?,
            interaction_type: interaction_type
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            channel: row.try_get("channel")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            options,
            status: status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            expires_at: row.try_get("expires_at")?,
            warning_sent: row.try_get("warning_sent")?,
            response: row.try_get("response")?,
            created_at: row.try_get("created_at")?,
            responded_at: row.try_get("responded_at")?,
        })
    }
}
