//! PostgreSQL implementation of [`PauseStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PauseStore;
use crate::db::models::{
    Interaction, InteractionStatus, PauseRecord, PauseTransition, WorkflowExecution,
    WorkflowStatus,
};
use crate::db::queries::{execution, interaction, pause};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

/// Store backed by the engine tables in PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn is_unique_violation(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl PauseStore for PgStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        execution::insert_execution(&self.pool, execution).await
    }

    async fn get_execution(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>> {
        execution::get_execution(&self.pool, execution_id).await
    }

    async fn update_execution(
        &self,
        execution_id: &str,
        status: WorkflowStatus,
        checkpoint: &serde_json::Value,
        error_message: Option<&str>,
    ) -> AppResult<WorkflowExecution> {
        if status == WorkflowStatus::Paused {
            return Err(AppError::Validation(
                "executions are paused through suspend only".to_string(),
            ));
        }

        match execution::update_unpaused_execution(
            &self.pool,
            execution_id,
            status,
            checkpoint,
            error_message,
        )
        .await?
        {
            Some(updated) => Ok(updated),
            None => match execution::get_execution(&self.pool, execution_id).await? {
                Some(_) => Err(AppError::Conflict(format!(
                    "execution {} is paused",
                    execution_id
                ))),
                None => Err(AppError::NotFound(format!("execution {}", execution_id))),
            },
        }
    }

    async fn suspend(
        &self,
        pause_record: &PauseRecord,
        interaction_row: &Interaction,
        checkpoint: &serde_json::Value,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        if pause::get_active_pause(&mut *tx, &pause_record.execution_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateSuspension(pause_record.execution_id.clone()));
        }

        if let Err(err) = pause::insert_pause(&mut *tx, pause_record).await {
            if is_unique_violation(&err) {
                return Err(AppError::DuplicateSuspension(pause_record.execution_id.clone()));
            }
            return Err(err);
        }
        interaction::insert_interaction(&mut *tx, interaction_row).await?;

        if !execution::mark_paused(&mut *tx, &pause_record.execution_id, checkpoint).await? {
            return Err(AppError::Conflict(format!(
                "execution {} is not running",
                pause_record.execution_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn transition_pause(
        &self,
        execution_id: &str,
        transition: &PauseTransition,
    ) -> AppResult<Option<PauseRecord>> {
        let mut tx = self.pool.begin().await?;

        let resolved = pause::resolve_active_pause(
            &mut *tx,
            execution_id,
            transition.pause_status,
            transition.reason.as_deref(),
            transition.resume_data.as_ref(),
            transition.expected_pause_id.as_deref(),
        )
        .await?;

        let Some(record) = resolved else {
            tx.rollback().await?;
            return Ok(None);
        };

        interaction::resolve_for_pause(
            &mut *tx,
            &record.id,
            InteractionStatus::following(transition.pause_status),
            transition.resume_data.as_ref(),
        )
        .await?;
        execution::set_status_from_paused(
            &mut *tx,
            execution_id,
            transition.execution_status,
            transition.error_message.as_deref(),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn get_active_pause(&self, execution_id: &str) -> AppResult<Option<PauseRecord>> {
        pause::get_active_pause(&self.pool, execution_id).await
    }

    async fn expired_pauses(&self, now: DateTime<Utc>) -> AppResult<Vec<PauseRecord>> {
        pause::list_expired(&self.pool, now).await
    }

    async fn interactions_due_for_warning(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> AppResult<Vec<Interaction>> {
        interaction::list_due_for_warning(&self.pool, now, now + window).await
    }

    async fn mark_warning_sent(&self, interaction_id: &str) -> AppResult<bool> {
        interaction::mark_warning_sent(&self.pool, interaction_id).await
    }

    async fn get_interaction(&self, interaction_id: &str) -> AppResult<Option<Interaction>> {
        interaction::get_interaction(&self.pool, interaction_id).await
    }
}
