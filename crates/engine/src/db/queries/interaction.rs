//! Interaction queries.

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgExecutor};

use crate::db::models::{Interaction, InteractionStatus};
use crate::error::AppResult;

const INTERACTION_COLUMNS: &str = "id, execution_id, step_id, pause_id, interaction_type, channel, \
     title, message, options, status, expires_at, warning_sent, response, created_at, responded_at";

/// Insert a new interaction.
pub async fn insert_interaction<'e, E>(executor: E, interaction: &Interaction) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO interaction (
            id, execution_id, step_id, pause_id, interaction_type, channel,
            title, message, options, status, expires_at, warning_sent, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&interaction.id)
    .bind(&interaction.execution_id)
    .bind(&interaction.step_id)
    .bind(&interaction.pause_id)
    .bind(interaction.interaction_type.as_str())
    .bind(&interaction.channel)
    .bind(&interaction.title)
    .bind(&interaction.message)
    .bind(Json(&interaction.options))
    .bind(interaction.status.as_str())
    .bind(interaction.expires_at)
    .bind(interaction.warning_sent)
    .bind(interaction.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get an interaction by id.
pub async fn get_interaction<'e, E>(executor: E, id: &str) -> AppResult<Option<Interaction>>
where
    E: PgExecutor<'e>,
{
    let interaction = sqlx::query_as::<_, Interaction>(&format!(
        "SELECT {} FROM interaction WHERE id = $1",
        INTERACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(interaction)
}

/// Resolve the pending interactions of a pause.
pub async fn resolve_for_pause<'e, E>(
    executor: E,
    pause_id: &str,
    status: InteractionStatus,
    response: Option<&serde_json::Value>,
) -> AppResult<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE interaction
        SET status = $2, response = $3, responded_at = $4
        WHERE pause_id = $1 AND status = 'pending'
        "#,
    )
    .bind(pause_id)
    .bind(status.as_str())
    .bind(response)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Pending, not yet warned interactions expiring in `(now, until]`.
pub async fn list_due_for_warning<'e, E>(
    executor: E,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> AppResult<Vec<Interaction>>
where
    E: PgExecutor<'e>,
{
    let interactions = sqlx::query_as::<_, Interaction>(&format!(
        r#"
        SELECT {} FROM interaction
        WHERE status = 'pending' AND NOT warning_sent
          AND expires_at > $1 AND expires_at <= $2
        ORDER BY expires_at
        "#,
        INTERACTION_COLUMNS
    ))
    .bind(now)
    .bind(until)
    .fetch_all(executor)
    .await?;

    Ok(interactions)
}

/// Flag a pending interaction as warned. Returns false if it was already
/// warned or is no longer pending.
pub async fn mark_warning_sent<'e, E>(executor: E, id: &str) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE interaction
        SET warning_sent = TRUE
        WHERE id = $1 AND status = 'pending' AND NOT warning_sent
        "#,
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
