//! In-memory implementation of [`PauseStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::PauseStore;
use crate::db::models::{
    Interaction, InteractionStatus, PauseRecord, PauseTransition, WorkflowExecution,
    WorkflowStatus,
};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    executions: HashMap<String, WorkflowExecution>,
    pauses: HashMap<String, PauseRecord>,
    interactions: HashMap<String, Interaction>,
}

impl Tables {
    fn active_pause(&self, execution_id: &str) -> Option<&PauseRecord> {
        self.pauses
            .values()
            .find(|p| p.execution_id == execution_id && p.is_active())
    }
}

/// Store keeping every table behind one lock, so each trait call is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause recorded for an execution, in creation order.
    pub async fn pauses_for(&self, execution_id: &str) -> Vec<PauseRecord> {
        let tables = self.tables.lock().await;
        let mut pauses: Vec<PauseRecord> = tables
            .pauses
            .values()
            .filter(|p| p.execution_id == execution_id)
            .cloned()
            .collect();
        pauses.sort_by_key(|p| p.created_at);
        pauses
    }

    /// Every execution, oldest first.
    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        let tables = self.tables.lock().await;
        let mut executions: Vec<WorkflowExecution> = tables.executions.values().cloned().collect();
        executions.sort_by_key(|e| e.created_at);
        executions
    }

    /// Move a pause deadline, e.g. to simulate elapsed time in tests.
    pub async fn set_timeout_at(&self, pause_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let pause = tables
            .pauses
            .get_mut(pause_id)
            .ok_or_else(|| AppError::NotFound(format!("pause {}", pause_id)))?;
        pause.timeout_at = at;
        for interaction in tables.interactions.values_mut() {
            if interaction.pause_id == pause_id {
                interaction.expires_at = at;
            }
        }
        Ok(())
    }

    /// Overwrite an execution's stored checkpoint regardless of its status.
    pub async fn replace_checkpoint(
        &self,
        execution_id: &str,
        checkpoint: serde_json::Value,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let execution = tables
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))?;
        execution.checkpoint = checkpoint;
        Ok(())
    }
}

#[async_trait]
impl PauseStore for InMemoryStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.executions.contains_key(&execution.id) {
            return Err(AppError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        tables
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>> {
        Ok(self.tables.lock().await.executions.get(execution_id).cloned())
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

        let mut tables = self.tables.lock().await;
        let execution = tables
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))?;
        if execution.status == WorkflowStatus::Paused {
            return Err(AppError::Conflict(format!("execution {} is paused", execution_id)));
        }

        execution.status = status;
        execution.checkpoint = checkpoint.clone();
        execution.error_message = error_message.map(str::to_string);
        execution.updated_at = Utc::now();
        Ok(execution.clone())
    }

    async fn suspend(
        &self,
        pause: &PauseRecord,
        interaction: &Interaction,
        checkpoint: &serde_json::Value,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.active_pause(&pause.execution_id).is_some() {
            return Err(AppError::DuplicateSuspension(pause.execution_id.clone()));
        }

        let execution = tables
            .executions
            .get_mut(&pause.execution_id)
            .ok_or_else(|| AppError::NotFound(format!("execution {}", pause.execution_id)))?;
        if execution.status != WorkflowStatus::Running {
            return Err(AppError::Conflict(format!(
                "execution {} is not running",
                pause.execution_id
            )));
        }
        execution.status = WorkflowStatus::Paused;
        execution.checkpoint = checkpoint.clone();
        execution.updated_at = Utc::now();

        tables.pauses.insert(pause.id.clone(), pause.clone());
        tables
            .interactions
            .insert(interaction.id.clone(), interaction.clone());
        Ok(())
    }

    async fn transition_pause(
        &self,
        execution_id: &str,
        transition: &PauseTransition,
    ) -> AppResult<Option<PauseRecord>> {
        let mut tables = self.tables.lock().await;
        let pause_id = match tables.active_pause(execution_id) {
            Some(p) => p.id.clone(),
            None => return Ok(None),
        };
        if let Some(expected) = &transition.expected_pause_id {
            if *expected != pause_id {
                return Ok(None);
            }
        }

        let now = Utc::now();
        let record = match tables.pauses.get_mut(&pause_id) {
            Some(pause) => {
                pause.status = transition.pause_status;
                pause.resume_reason = transition.reason.clone();
                pause.resume_data = transition.resume_data.clone();
                pause.resolved_at = Some(now);
                pause.clone()
            }
            None => return Ok(None),
        };

        let follow = InteractionStatus::following(transition.pause_status);
        for interaction in tables.interactions.values_mut() {
            if interaction.pause_id == pause_id && interaction.status == InteractionStatus::Pending {
                interaction.status = follow;
                interaction.response = transition.resume_data.clone();
                interaction.responded_at = Some(now);
            }
        }

        if let Some(execution) = tables.executions.get_mut(execution_id) {
            if execution.status == WorkflowStatus::Paused {
                execution.status = transition.execution_status;
                if transition.error_message.is_some() {
                    execution.error_message = transition.error_message.clone();
                }
                execution.updated_at = now;
            }
        }

        Ok(Some(record))
    }

    async fn get_active_pause(&self, execution_id: &str) -> AppResult<Option<PauseRecord>> {
        Ok(self.tables.lock().await.active_pause(execution_id).cloned())
    }

    async fn expired_pauses(&self, now: DateTime<Utc>) -> AppResult<Vec<PauseRecord>> {
        let tables = self.tables.lock().await;
        let mut expired: Vec<PauseRecord> = tables
            .pauses
            .values()
            .filter(|p| p.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|p| p.timeout_at);
        Ok(expired)
    }

    async fn interactions_due_for_warning(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> AppResult<Vec<Interaction>> {
        let until = now + window;
        let tables = self.tables.lock().await;
        let mut due: Vec<Interaction> = tables
            .interactions
            .values()
            .filter(|i| {
                i.status == InteractionStatus::Pending
                    && !i.warning_sent
                    && i.expires_at > now
                    && i.expires_at <= until
            })
            .cloned()
            .collect();
        due.sort_by_key(|i| i.expires_at);
        Ok(due)
    }

    async fn mark_warning_sent(&self, interaction_id: &str) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.interactions.get_mut(interaction_id) {
            Some(i) if i.status == InteractionStatus::Pending && !i.warning_sent => {
                i.warning_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_interaction(&self, interaction_id: &str) -> AppResult<Option<Interaction>> {
        Ok(self.tables.lock().await.interactions.get(interaction_id).cloned())
    }
}
