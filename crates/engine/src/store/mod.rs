//! Persistence collaborator for executions, pauses and interactions.
//!
//! Implementations must apply every pause transition atomically together with
//! the execution status change, and only while the record is still active.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{
    Interaction, PauseRecord, PauseTransition, WorkflowExecution, WorkflowStatus,
};
use crate::error::AppResult;

#[async_trait]
pub trait PauseStore: Send + Sync {
    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()>;

    async fn get_execution(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>>;

    /// Update a non-paused execution. `Paused` is only reachable through
    /// [`PauseStore::suspend`]; a paused execution only leaves that state through
    /// [`PauseStore::transition_pause`].
    async fn update_execution(
        &self,
        execution_id: &str,
        status: WorkflowStatus,
        checkpoint: &serde_json::Value,
        error_message: Option<&str>,
    ) -> AppResult<WorkflowExecution>;

    /// Persist a new active pause with its interaction and flip the running
    /// execution to `Paused`. Fails with `DuplicateSuspension` when the
    /// execution already has an active pause.
    async fn suspend(
        &self,
        pause: &PauseRecord,
        interaction: &Interaction,
        checkpoint: &serde_json::Value,
    ) -> AppResult<()>;

    /// Conditionally resolve the active pause of an execution.
    ///
    /// Returns `None` and mutates nothing when no eligible active pause exists.
    async fn transition_pause(
        &self,
        execution_id: &str,
        transition: &PauseTransition,
    ) -> AppResult<Option<PauseRecord>>;

    async fn get_active_pause(&self, execution_id: &str) -> AppResult<Option<PauseRecord>>;

    /// Active pauses with `timeout_at <= now`.
    async fn expired_pauses(&self, now: DateTime<Utc>) -> AppResult<Vec<PauseRecord>>;

    /// Pending interactions not yet warned, expiring in `(now, now + window]`.
    async fn interactions_due_for_warning(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> AppResult<Vec<Interaction>>;

    /// Returns true only for the call that flipped the flag.
    async fn mark_warning_sent(&self, interaction_id: &str) -> AppResult<bool>;

    async fn get_interaction(&self, interaction_id: &str) -> AppResult<Option<Interaction>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};
    use weft_steps::{InteractionType, TimeoutAction};

    use crate::db::models::{
        Interaction, InteractionStatus, PauseRecord, PauseStatus, WorkflowExecution,
    };

    /// A running execution plus a pause and interaction for it, expiring in one hour.
    pub fn fixture() -> (WorkflowExecution, PauseRecord, Interaction) {
        let execution = WorkflowExecution::new(
            "wf-store",
            serde_json::json!({"id": "wf-store", "nodes": [], "edges": []}),
            serde_json::json!({}),
        );
        let now = Utc::now();
        let pause = PauseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution.id.clone(),
            paused_step_id: "approve".to_string(),
            pause_reason: "awaiting approval".to_string(),
            resume_conditions: serde_json::Map::new(),
            status: PauseStatus::Active,
            timeout_at: now + Duration::hours(1),
            timeout_action: TimeoutAction::Fail,
            default_response: None,
            resume_reason: None,
            resume_data: None,
            created_at: now,
            resolved_at: None,
        };
        let interaction = Interaction {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution.id.clone(),
            step_id: "approve".to_string(),
            pause_id: pause.id.clone(),
            interaction_type: InteractionType::Approval,
            channel: "log".to_string(),
            title: "Approval".to_string(),
            message: "Approve?".to_string(),
            options: Vec::new(),
            status: InteractionStatus::Pending,
            expires_at: pause.timeout_at,
            warning_sent: false,
            response: None,
            created_at: now,
            responded_at: None,
        };
        (execution, pause, interaction)
    }
}
