//! Pause record queries.
//!
//! Every update here is conditional on `status = 'active'`; a record that has
//! already left the active state is never touched again.

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgExecutor};

use crate::db::models::{PauseRecord, PauseStatus};
use crate::error::AppResult;

const PAUSE_COLUMNS: &str = "id, execution_id, paused_step_id, pause_reason, resume_conditions, \
     status, timeout_at, timeout_action, default_response, resume_reason, resume_data, \
     created_at, resolved_at";

/// Insert a new pause record.
pub async fn insert_pause<'e, E>(executor: E, pause: &PauseRecord) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO pause_record (
            id, execution_id, paused_step_id, pause_reason, resume_conditions,
            status, timeout_at, timeout_action, default_response, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&pause.id)
    .bind(&pause.execution_id)
    .bind(&pause.paused_step_id)
    .bind(&pause.pause_reason)
    .bind(Json(&pause.resume_conditions))
    .bind(pause.status.as_str())
    .bind(pause.timeout_at)
    .bind(pause.timeout_action.as_str())
    .bind(&pause.default_response)
    .bind(pause.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get the active pause of an execution.
pub async fn get_active_pause<'e, E>(executor: E, execution_id: &str) -> AppResult<Option<PauseRecord>>
where
    E: PgExecutor<'e>,
{
    let pause = sqlx::query_as::<_, PauseRecord>(&format!(
        "SELECT {} FROM pause_record WHERE execution_id = $1 AND status = 'active'",
        PAUSE_COLUMNS
    ))
    .bind(execution_id)
    .fetch_optional(executor)
    .await?;

    Ok(pause)
}

/// Move the active pause of an execution to `status`.
///
/// With `expected_id` set, only that record is eligible. Returns the updated
/// record, or `None` when no eligible active record exists.
pub async fn resolve_active_pause<'e, E>(
    executor: E,
    execution_id: &str,
    status: PauseStatus,
    reason: Option<&str>,
    resume_data: Option<&serde_json::Value>,
    expected_id: Option<&str>,
) -> AppResult<Option<PauseRecord>>
where
    E: PgExecutor<'e>,
{
    let pause = sqlx::query_as::<_, PauseRecord>(&format!(
        r#"
        UPDATE pause_record
        SET status = $2, resume_reason = $3, resume_data = $4, resolved_at = $5
        WHERE execution_id = $1
          AND status = 'active'
          AND ($6::text IS NULL OR id = $6)
        RETURNING {}
        "#,
        PAUSE_COLUMNS
    ))
    .bind(execution_id)
    .bind(status.as_str())
    .bind(reason)
    .bind(resume_data)
    .bind(Utc::now())
    .bind(expected_id)
    .fetch_optional(executor)
    .await?;

    Ok(pause)
}

/// Active pauses whose deadline has passed, oldest deadline first.
pub async fn list_expired<'e, E>(executor: E, now: DateTime<Utc>) -> AppResult<Vec<PauseRecord>>
where
    E: PgExecutor<'e>,
{
    let pauses = sqlx::query_as::<_, PauseRecord>(&format!(
        "SELECT {} FROM pause_record WHERE status = 'active' AND timeout_at <= $1 ORDER BY timeout_at",
        PAUSE_COLUMNS
    ))
    .bind(now)
    .fetch_all(executor)
    .await?;

    Ok(pauses)
}
