//! Workflow Status Manager.
//!
//! Owns every pause, resume, cancel and timeout transition. Each one goes
//! through [`PauseStore::transition_pause`], which only applies while the pause
//! is still active, so a resume racing a timeout sweep has exactly one winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use weft_steps::{
    ExecutionObserver, JsonMap, LifecycleEvent, LifecycleKind, PauseRequest, TimeoutAction,
    TracingObserver, MAX_TIMEOUT_HOURS,
};

use crate::db::models::{
    Interaction, InteractionStatus, PauseRecord, PauseStatus, PauseTransition, WorkflowStatus,
};
use crate::error::{AppError, AppResult};
use crate::store::PauseStore;

/// Timeout used when a pause request does not name one.
pub const DEFAULT_TIMEOUT_HOURS: f64 = 24.0;

/// Absolute deadline `hours` after `now`.
pub(crate) fn pause_deadline(now: DateTime<Utc>, hours: f64) -> AppResult<DateTime<Utc>> {
    if !hours.is_finite() || hours <= 0.0 || hours > MAX_TIMEOUT_HOURS {
        return Err(AppError::Validation(format!(
            "timeout_hours must be in (0, {}], got {}",
            MAX_TIMEOUT_HOURS, hours
        )));
    }

    let delay = chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64);
    now.checked_add_signed(delay).ok_or_else(|| {
        AppError::Validation(format!("timeout of {} hours is out of range", hours))
    })
}

/// Read-only view of an execution's pause state.
#[derive(Debug, Clone, Serialize)]
pub struct PauseStatusView {
    pub execution_id: String,
    pub execution_status: WorkflowStatus,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseRecord>,
}

/// Outcome of applying a timeout policy to an expired pause.
#[derive(Debug, Clone)]
pub struct TimeoutOutcome {
    pub action: TimeoutAction,
    pub record: PauseRecord,
    /// Output the paused step takes when the policy continues the execution.
    pub continue_with: Option<serde_json::Value>,
}

pub struct WorkflowStatusManager {
    store: Arc<dyn PauseStore>,
    observer: Arc<dyn ExecutionObserver>,
    default_timeout_hours: f64,
}

impl WorkflowStatusManager {
    pub fn new(store: Arc<dyn PauseStore>) -> Self {
        Self {
            store,
            observer: Arc::new(TracingObserver),
            default_timeout_hours: DEFAULT_TIMEOUT_HOURS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_default_timeout_hours(mut self, hours: f64) -> Self {
        self.default_timeout_hours = hours;
        self
    }

    pub fn store(&self) -> &Arc<dyn PauseStore> {
        &self.store
    }

    pub fn observer(&self) -> &Arc<dyn ExecutionObserver> {
        &self.observer
    }

    /// Persist an active pause for `step_id` and flip the execution to Paused.
    ///
    /// `checkpoint` is stored with the execution in the same write.
    pub async fn create_pause_record(
        &self,
        execution_id: &str,
        step_id: &str,
        request: &PauseRequest,
        checkpoint: &serde_json::Value,
    ) -> AppResult<(PauseRecord, Interaction)> {
        let hours = request.timeout_hours.unwrap_or(self.default_timeout_hours);
        let now = Utc::now();
        let timeout_at = pause_deadline(now, hours)?;

        let pause = PauseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            paused_step_id: step_id.to_string(),
            pause_reason: request.reason.clone(),
            resume_conditions: request.resume_conditions.clone(),
            status: PauseStatus::Active,
            timeout_at,
            timeout_action: request.timeout_action,
            default_response: request.default_response.clone(),
            resume_reason: None,
            resume_data: None,
            created_at: now,
            resolved_at: None,
        };

        let spec = &request.interaction;
        let interaction = Interaction {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            step_id: step_id.to_string(),
            pause_id: pause.id.clone(),
            interaction_type: spec.interaction_type,
            channel: spec.channel.clone(),
            title: spec.title.clone(),
            message: spec.message.clone(),
            options: spec.options.clone(),
            status: InteractionStatus::Pending,
            expires_at: timeout_at,
            warning_sent: false,
            response: None,
            created_at: now,
            responded_at: None,
        };

        self.store.suspend(&pause, &interaction, checkpoint).await?;

        tracing::info!(
            execution_id = %execution_id,
            step_id = %step_id,
            pause_id = %pause.id,
            timeout_at = %timeout_at,
            timeout_action = pause.timeout_action.as_str(),
            "Execution paused"
        );
        self.observer.on_lifecycle(
            &LifecycleEvent::new(LifecycleKind::Paused, execution_id)
                .with_step(step_id)
                .with_reason(&pause.pause_reason),
        );

        Ok((pause, interaction))
    }

    /// Resume a paused execution once `resume_data` satisfies the pause's
    /// resume conditions.
    ///
    /// A condition mismatch fails with `ConditionNotMet` and leaves the pause
    /// active.
    pub async fn resume_workflow_execution(
        &self,
        execution_id: &str,
        resume_reason: &str,
        resume_data: Option<serde_json::Value>,
    ) -> AppResult<PauseRecord> {
        let active = self.store.get_active_pause(execution_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("no active pause for execution {}", execution_id))
        })?;

        check_resume_conditions(&active.resume_conditions, resume_data.as_ref())
            .map_err(AppError::ConditionNotMet)?;

        let transition = PauseTransition::new(PauseStatus::Resumed, WorkflowStatus::Running)
            .with_reason(resume_reason)
            .with_resume_data(resume_data)
            .expecting(&active.id);

        let record = self
            .store
            .transition_pause(execution_id, &transition)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("pause {} is no longer active", active.id))
            })?;

        tracing::info!(
            execution_id = %execution_id,
            pause_id = %record.id,
            step_id = %record.paused_step_id,
            reason = %resume_reason,
            "Execution resumed"
        );
        self.observer.on_lifecycle(
            &LifecycleEvent::new(LifecycleKind::Resumed, execution_id)
                .with_step(&record.paused_step_id)
                .with_reason(resume_reason),
        );

        Ok(record)
    }

    /// Cancel a paused execution. Returns false, without mutating anything,
    /// when the execution has no active pause.
    pub async fn cancel_paused_execution(
        &self,
        execution_id: &str,
        reason: Option<&str>,
    ) -> AppResult<bool> {
        let reason = reason.unwrap_or("cancelled");
        let transition = PauseTransition::new(PauseStatus::Cancelled, WorkflowStatus::Cancelled)
            .with_reason(reason);

        match self.store.transition_pause(execution_id, &transition).await? {
            Some(record) => {
                tracing::info!(
                    execution_id = %execution_id,
                    pause_id = %record.id,
                    reason = %reason,
                    "Paused execution cancelled"
                );
                self.observer.on_lifecycle(
                    &LifecycleEvent::new(LifecycleKind::Cancelled, execution_id)
                        .with_step(&record.paused_step_id)
                        .with_reason(reason),
                );
                Ok(true)
            }
            None => {
                tracing::debug!(execution_id = %execution_id, "No active pause to cancel");
                Ok(false)
            }
        }
    }

    /// Apply the pause's own timeout policy.
    ///
    /// Returns `None` when the record is no longer active, e.g. because a
    /// resume won the race.
    pub async fn timeout_pause(&self, pause: &PauseRecord) -> AppResult<Option<TimeoutOutcome>> {
        let base = match pause.timeout_action {
            TimeoutAction::Continue => {
                let data = pause
                    .default_response
                    .clone()
                    .unwrap_or_else(synthesized_timeout_response);
                PauseTransition::new(PauseStatus::Timeout, WorkflowStatus::Running)
                    .with_resume_data(Some(data))
            }
            TimeoutAction::Cancel => {
                PauseTransition::new(PauseStatus::Cancelled, WorkflowStatus::Cancelled)
            }
            TimeoutAction::Fail => PauseTransition::new(PauseStatus::Timeout, WorkflowStatus::Error)
                .with_error(format!(
                    "Step '{}' timed out waiting for a response",
                    pause.paused_step_id
                )),
        };
        let transition = base
            .with_reason(format!("timeout ({})", pause.timeout_action.as_str()))
            .expecting(&pause.id);

        let Some(record) = self
            .store
            .transition_pause(&pause.execution_id, &transition)
            .await?
        else {
            tracing::debug!(
                execution_id = %pause.execution_id,
                pause_id = %pause.id,
                "Pause no longer active, timeout skipped"
            );
            return Ok(None);
        };

        tracing::info!(
            execution_id = %record.execution_id,
            pause_id = %record.id,
            timeout_action = record.timeout_action.as_str(),
            "Pause timed out"
        );
        self.observer.on_lifecycle(
            &LifecycleEvent::new(LifecycleKind::TimedOut, &record.execution_id)
                .with_step(&record.paused_step_id)
                .with_reason(record.timeout_action.as_str()),
        );

        let continue_with = match record.timeout_action {
            TimeoutAction::Continue => record.resume_data.clone(),
            _ => None,
        };
        Ok(Some(TimeoutOutcome {
            action: record.timeout_action,
            record,
            continue_with,
        }))
    }

    pub async fn get_pause_status(&self, execution_id: &str) -> AppResult<PauseStatusView> {
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))?;
        let pause = self.store.get_active_pause(execution_id).await?;

        Ok(PauseStatusView {
            execution_id: execution.id,
            execution_status: execution.status,
            paused: pause.is_some(),
            pause,
        })
    }

    /// Record that a timeout warning went out for an interaction.
    pub fn emit_warning(&self, interaction: &Interaction) {
        self.observer.on_lifecycle(
            &LifecycleEvent::new(LifecycleKind::TimeoutWarning, &interaction.execution_id)
                .with_step(&interaction.step_id)
                .with_reason(format!("expires at {}", interaction.expires_at.to_rfc3339())),
        );
    }
}

fn synthesized_timeout_response() -> serde_json::Value {
    serde_json::json!({
        "timed_out": true,
        "timeout_action": TimeoutAction::Continue.as_str(),
    })
}

/// Check that every key of `conditions` is present in `data`, and equal to
/// the expected value unless that value is `null`.
pub fn check_resume_conditions(
    conditions: &JsonMap,
    data: Option<&serde_json::Value>,
) -> Result<(), String> {
    if conditions.is_empty() {
        return Ok(());
    }
    let Some(object) = data.and_then(|d| d.as_object()) else {
        return Err(format!(
            "resume data must be an object with keys: {}",
            conditions.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
    };

    for (key, expected) in conditions {
        let Some(actual) = object.get(key) else {
            return Err(format!("missing required key '{}'", key));
        };
        if !expected.is_null() && !same_value(expected, actual) {
            return Err(format!(
                "key '{}' must be {}, got {}",
                key, expected, actual
            ));
        }
    }
    Ok(())
}

fn same_value(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::WorkflowExecution;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use weft_steps::{InteractionSpec, InteractionType, RecordingObserver};

    fn approval_request(action: TimeoutAction) -> PauseRequest {
        let mut conditions = JsonMap::new();
        conditions.insert("approved".to_string(), json!(true));
        PauseRequest {
            reason: "awaiting approval".to_string(),
            resume_conditions: conditions,
            timeout_hours: Some(2.0),
            timeout_action: action,
            default_response: None,
            interaction: InteractionSpec {
                interaction_type: InteractionType::Approval,
                channel: "log".to_string(),
                title: "Approve".to_string(),
                message: "Approve the order?".to_string(),
                options: Vec::new(),
            },
        }
    }

    async fn paused(
        action: TimeoutAction,
    ) -> (WorkflowStatusManager, Arc<InMemoryStore>, Arc<RecordingObserver>, String) {
        let store = Arc::new(InMemoryStore::new());
        let observer = Arc::new(RecordingObserver::new());
        let manager = WorkflowStatusManager::new(store.clone()).with_observer(observer.clone());

        let execution = WorkflowExecution::new("wf", json!({}), json!({}));
        store.create_execution(&execution).await.unwrap();
        manager
            .create_pause_record(&execution.id, "approve", &approval_request(action), &json!({}))
            .await
            .unwrap();
        (manager, store, observer, execution.id)
    }

    async fn execution_status(store: &InMemoryStore, id: &str) -> WorkflowStatus {
        store.get_execution(id).await.unwrap().unwrap().status
    }

    #[test]
    fn test_pause_deadline_bounds() {
        let now = Utc::now();
        assert_eq!(
            pause_deadline(now, 0.25).unwrap() - now,
            chrono::Duration::minutes(15)
        );
        for hours in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e10, MAX_TIMEOUT_HOURS + 1.0] {
            assert!(matches!(pause_deadline(now, hours), Err(AppError::Validation(_))), "{}", hours);
        }
        assert!(matches!(
            pause_deadline(DateTime::<Utc>::MAX_UTC, 1.0),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_timeout_rejected_before_pausing() {
        let store = Arc::new(InMemoryStore::new());
        let manager = WorkflowStatusManager::new(store.clone());
        let execution = WorkflowExecution::new("wf", json!({}), json!({}));
        store.create_execution(&execution).await.unwrap();

        let mut request = approval_request(TimeoutAction::Fail);
        request.timeout_hours = Some(1e10);
        let err = manager
            .create_pause_record(&execution.id, "approve", &request, &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(execution_status(&store, &execution.id).await, WorkflowStatus::Running);
        assert!(store.get_active_pause(&execution.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_pause_sets_deadline_and_pauses() {
        let (manager, store, observer, id) = paused(TimeoutAction::Fail).await;

        let view = manager.get_pause_status(&id).await.unwrap();
        assert!(view.paused);
        assert_eq!(view.execution_status, WorkflowStatus::Paused);
        let pause = view.pause.unwrap();
        let minutes = (pause.timeout_at - pause.created_at).num_minutes();
        assert_eq!(minutes, 120);
        assert_eq!(execution_status(&store, &id).await, WorkflowStatus::Paused);
        assert_eq!(observer.lifecycle_kinds(), vec![LifecycleKind::Paused]);
    }

    #[tokio::test]
    async fn test_second_pause_is_duplicate_suspension() {
        let (manager, _, _, id) = paused(TimeoutAction::Fail).await;
        let err = manager
            .create_pause_record(&id, "approve", &approval_request(TimeoutAction::Fail), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateSuspension(_)));
    }

    #[tokio::test]
    async fn test_non_positive_timeout_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let manager = WorkflowStatusManager::new(store.clone());
        let mut request = approval_request(TimeoutAction::Fail);
        request.timeout_hours = Some(0.0);

        let err = manager
            .create_pause_record("missing", "approve", &request, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resume_with_unmet_conditions_keeps_pause_active() {
        let (manager, store, _, id) = paused(TimeoutAction::Fail).await;

        let err = manager
            .resume_workflow_execution(&id, "reviewer", Some(json!({"approved": false})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConditionNotMet(_)));

        let err = manager
            .resume_workflow_execution(&id, "reviewer", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConditionNotMet(_)));

        assert!(store.get_active_pause(&id).await.unwrap().is_some());
        assert_eq!(execution_status(&store, &id).await, WorkflowStatus::Paused);
    }

    #[tokio::test]
    async fn test_resume_with_satisfied_conditions() {
        let (manager, store, observer, id) = paused(TimeoutAction::Fail).await;

        let record = manager
            .resume_workflow_execution(&id, "reviewer", Some(json!({"approved": true, "note": "ok"})))
            .await
            .unwrap();
        assert_eq!(record.status, PauseStatus::Resumed);
        assert_eq!(execution_status(&store, &id).await, WorkflowStatus::Running);
        assert!(store.get_active_pause(&id).await.unwrap().is_none());
        assert_eq!(
            observer.lifecycle_kinds(),
            vec![LifecycleKind::Paused, LifecycleKind::Resumed]
        );

        let err = manager
            .resume_workflow_execution(&id, "reviewer", Some(json!({"approved": true})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_twice() {
        let (manager, store, _, id) = paused(TimeoutAction::Fail).await;

        assert!(manager.cancel_paused_execution(&id, None).await.unwrap());
        let after_first = store.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(after_first.status, WorkflowStatus::Cancelled);

        assert!(!manager.cancel_paused_execution(&id, None).await.unwrap());
        let after_second = store.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(after_second.updated_at, after_first.updated_at);
        let pauses = store.pauses_for(&id).await;
        assert_eq!(pauses.len(), 1);
        assert_eq!(pauses[0].status, PauseStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_policies() {
        let (manager, store, _, id) = paused(TimeoutAction::Fail).await;
        let pause = store.get_active_pause(&id).await.unwrap().unwrap();
        let outcome = manager.timeout_pause(&pause).await.unwrap().unwrap();
        assert_eq!(outcome.record.status, PauseStatus::Timeout);
        assert!(outcome.continue_with.is_none());
        let row = store.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(row.status, WorkflowStatus::Error);
        assert!(row.error_message.unwrap().contains("timed out"));

        let (manager, store, _, id) = paused(TimeoutAction::Continue).await;
        let pause = store.get_active_pause(&id).await.unwrap().unwrap();
        let outcome = manager.timeout_pause(&pause).await.unwrap().unwrap();
        assert_eq!(outcome.record.status, PauseStatus::Timeout);
        assert_eq!(
            outcome.continue_with,
            Some(json!({"timed_out": true, "timeout_action": "continue"}))
        );
        assert_eq!(execution_status(&store, &id).await, WorkflowStatus::Running);

        // Second application observes a non-active record.
        assert!(manager.timeout_pause(&pause).await.unwrap().is_none());
    }

    #[test]
    fn test_check_resume_conditions() {
        let mut conditions = JsonMap::new();
        conditions.insert("approved".to_string(), json!(true));
        conditions.insert("comment".to_string(), json!(null));
        conditions.insert("level".to_string(), json!(2));

        assert!(check_resume_conditions(
            &conditions,
            Some(&json!({"approved": true, "comment": "", "level": 2.0}))
        )
        .is_ok());
        assert!(check_resume_conditions(&conditions, Some(&json!({"approved": true, "level": 2})))
            .unwrap_err()
            .contains("comment"));
        assert!(check_resume_conditions(&conditions, Some(&json!("yes"))).is_err());
        assert!(check_resume_conditions(&JsonMap::new(), None).is_ok());
    }
}
