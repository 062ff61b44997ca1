//! Workflow execution queries.

use chrono::Utc;
use sqlx::PgExecutor;

use crate::db::models::{WorkflowExecution, WorkflowStatus};
use crate::error::AppResult;

/// Insert a new execution row.
pub async fn insert_execution<'e, E>(executor: E, execution: &WorkflowExecution) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflow_execution (
            id, workflow_id, status, definition, input, checkpoint,
            error_message, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&execution.id)
    .bind(&execution.workflow_id)
    .bind(execution.status.as_str())
    .bind(&execution.definition)
    .bind(&execution.input)
    .bind(&execution.checkpoint)
    .bind(&execution.error_message)
    .bind(execution.created_at)
    .bind(execution.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get an execution by id.
pub async fn get_execution<'e, E>(executor: E, id: &str) -> AppResult<Option<WorkflowExecution>>
where
    E: PgExecutor<'e>,
{
    let execution = sqlx::query_as::<_, WorkflowExecution>(
        r#"
        SELECT id, workflow_id, status, definition, input, checkpoint,
               error_message, created_at, updated_at
        FROM workflow_execution
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(execution)
}

/// Update status, checkpoint and error of an execution that is not paused.
///
/// Returns the updated row, or `None` if the execution is missing or paused.
pub async fn update_unpaused_execution<'e, E>(
    executor: E,
    id: &str,
    status: WorkflowStatus,
    checkpoint: &serde_json::Value,
    error_message: Option<&str>,
) -> AppResult<Option<WorkflowExecution>>
where
    E: PgExecutor<'e>,
{
    let execution = sqlx::query_as::<_, WorkflowExecution>(
        r#"
        UPDATE workflow_execution
        SET status = $2, checkpoint = $3, error_message = $4, updated_at = $5
        WHERE id = $1 AND status <> 'paused'
        RETURNING id, workflow_id, status, definition, input, checkpoint,
                  error_message, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(checkpoint)
    .bind(error_message)
    .bind(Utc::now())
    .fetch_optional(executor)
    .await?;

    Ok(execution)
}

/// Mark an execution paused and store its checkpoint.
pub async fn mark_paused<'e, E>(
    executor: E,
    id: &str,
    checkpoint: &serde_json::Value,
) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'paused', checkpoint = $2, updated_at = $3
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(checkpoint)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Set the status of a paused execution. Used inside pause transitions only.
pub async fn set_status_from_paused<'e, E>(
    executor: E,
    id: &str,
    status: WorkflowStatus,
    error_message: Option<&str>,
) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = $2, error_message = COALESCE($3, error_message), updated_at = $4
        WHERE id = $1 AND status = 'paused'
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error_message)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}
