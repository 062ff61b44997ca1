//! Timeout Monitor.
//!
//! A periodic sweep that applies each expired pause's timeout policy and sends
//! one warning per interaction entering the warning window. Every write it
//! makes is conditional on the pause or interaction still being active, so
//! overlapping sweeps and concurrent resumes are safe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use weft_steps::TimeoutAction;

use crate::error::AppResult;
use crate::hil::SuspensionService;
use crate::status::WorkflowStatusManager;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Default warning window ahead of an interaction's deadline.
pub const DEFAULT_WARNING_MINUTES: i64 = 15;

/// Hands a resumed execution back to the engine.
#[async_trait]
pub trait ExecutionResumer: Send + Sync {
    /// Continue `execution_id` from `paused_step_id`, using `output` as that
    /// step's result.
    async fn continue_execution(
        &self,
        execution_id: &str,
        paused_step_id: &str,
        output: serde_json::Value,
    ) -> AppResult<()>;
}

/// Counts of what one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub continued: usize,
    pub cancelled: usize,
    pub failed: usize,
    /// Expired pauses that were resolved by someone else first.
    pub lost_race: usize,
    pub warnings_sent: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

pub struct TimeoutMonitor {
    status: Arc<WorkflowStatusManager>,
    suspension: Arc<SuspensionService>,
    resumer: Option<Arc<dyn ExecutionResumer>>,
    interval: Duration,
    warning_window: chrono::Duration,
}

impl TimeoutMonitor {
    pub fn new(status: Arc<WorkflowStatusManager>, suspension: Arc<SuspensionService>) -> Self {
        Self {
            status,
            suspension,
            resumer: None,
            interval: DEFAULT_SWEEP_INTERVAL,
            warning_window: chrono::Duration::minutes(DEFAULT_WARNING_MINUTES),
        }
    }

    pub fn with_resumer(mut self, resumer: Arc<dyn ExecutionResumer>) -> Self {
        self.resumer = Some(resumer);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_warning_window(mut self, window: chrono::Duration) -> Self {
        self.warning_window = window;
        self
    }

    /// Run one sweep at `now`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.status.store().expired_pauses(now).await {
            Ok(expired) => {
                for pause in expired {
                    report.expired += 1;
                    match self.status.timeout_pause(&pause).await {
                        Ok(None) => report.lost_race += 1,
                        Ok(Some(outcome)) => match outcome.action {
                            TimeoutAction::Continue => {
                                report.continued += 1;
                                if let Some(resumer) = &self.resumer {
                                    let output = outcome
                                        .continue_with
                                        .unwrap_or(serde_json::Value::Null);
                                    if let Err(e) = resumer
                                        .continue_execution(
                                            &outcome.record.execution_id,
                                            &outcome.record.paused_step_id,
                                            output,
                                        )
                                        .await
                                    {
                                        report.errors += 1;
                                        tracing::error!(
                                            execution_id = %outcome.record.execution_id,
                                            error = %e,
                                            "Failed to continue timed out execution"
                                        );
                                    }
                                }
                            }
                            TimeoutAction::Cancel => report.cancelled += 1,
                            TimeoutAction::Fail => report.failed += 1,
                        },
                        Err(e) => {
                            report.errors += 1;
                            tracing::error!(
                                execution_id = %pause.execution_id,
                                pause_id = %pause.id,
                                error = %e,
                                "Failed to apply timeout policy"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.errors += 1;
                tracing::error!(error = %e, "Failed to query expired pauses");
            }
        }

        match self
            .status
            .store()
            .interactions_due_for_warning(now, self.warning_window)
            .await
        {
            Ok(due) => {
                for interaction in due {
                    match self.suspension.warn(&interaction).await {
                        Ok(true) => report.warnings_sent += 1,
                        Ok(false) => {}
                        Err(e) => {
                            report.errors += 1;
                            tracing::error!(
                                interaction_id = %interaction.id,
                                error = %e,
                                "Failed to send timeout warning"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.errors += 1;
                tracing::error!(error = %e, "Failed to query interactions due for warning");
            }
        }

        report
    }

    /// Sweep on every interval tick until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            warning_minutes = self.warning_window.num_minutes(),
            "Timeout monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once(Utc::now()).await;
                    if report.is_empty() {
                        tracing::trace!("Timeout sweep found nothing to do");
                    } else {
                        tracing::info!(
                            expired = report.expired,
                            continued = report.continued,
                            cancelled = report.cancelled,
                            failed = report.failed,
                            lost_race = report.lost_race,
                            warnings_sent = report.warnings_sent,
                            errors = report.errors,
                            "Timeout sweep finished"
                        );
                    }
                }
            }
        }

        tracing::info!("Timeout monitor stopped");
    }

    /// Start [`TimeoutMonitor::run`] on the runtime.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{PauseStatus, WorkflowExecution, WorkflowStatus};
    use crate::hil::RecordingNotifier;
    use crate::store::{InMemoryStore, PauseStore};
    use serde_json::json;
    use tokio::sync::Mutex;
    use weft_steps::{InteractionSpec, InteractionType, JsonMap, PauseRequest};

    #[derive(Default)]
    struct CapturingResumer {
        calls: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ExecutionResumer for CapturingResumer {
        async fn continue_execution(
            &self,
            execution_id: &str,
            paused_step_id: &str,
            output: serde_json::Value,
        ) -> AppResult<()> {
            self.calls.lock().await.push((
                execution_id.to_string(),
                paused_step_id.to_string(),
                output,
            ));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        status: Arc<WorkflowStatusManager>,
        notifier: Arc<RecordingNotifier>,
        resumer: Arc<CapturingResumer>,
        monitor: TimeoutMonitor,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let status = Arc::new(WorkflowStatusManager::new(store.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let suspension =
            Arc::new(SuspensionService::new(status.clone()).with_notifier(notifier.clone()));
        let resumer = Arc::new(CapturingResumer::default());
        let monitor = TimeoutMonitor::new(status.clone(), suspension)
            .with_resumer(resumer.clone())
            .with_warning_window(chrono::Duration::minutes(15));
        Harness {
            store,
            status,
            notifier,
            resumer,
            monitor,
        }
    }

    fn request(action: TimeoutAction, hours: f64) -> PauseRequest {
        PauseRequest {
            reason: "approval".to_string(),
            resume_conditions: JsonMap::new(),
            timeout_hours: Some(hours),
            timeout_action: action,
            default_response: None,
            interaction: InteractionSpec {
                interaction_type: InteractionType::Approval,
                channel: "log".to_string(),
                title: "Approve".to_string(),
                message: "Approve?".to_string(),
                options: Vec::new(),
            },
        }
    }

    impl Harness {
        async fn pause(&self, action: TimeoutAction, hours: f64) -> (String, String) {
            let execution = WorkflowExecution::new("wf", json!({}), json!({}));
            self.store.create_execution(&execution).await.unwrap();
            let (pause, _) = self
                .status
                .create_pause_record(&execution.id, "approve", &request(action, hours), &json!({}))
                .await
                .unwrap();
            (execution.id, pause.id)
        }

        async fn expire(&self, pause_id: &str) {
            self.store
                .set_timeout_at(pause_id, Utc::now() - chrono::Duration::minutes(1))
                .await
                .unwrap();
        }

        async fn execution_status(&self, id: &str) -> WorkflowStatus {
            self.store.get_execution(id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn test_cancel_policy_after_one_sweep() {
        let h = harness();
        let (execution_id, pause_id) = h.pause(TimeoutAction::Cancel, 1.0).await;
        h.expire(&pause_id).await;

        let report = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.cancelled, 1);

        let pauses = h.store.pauses_for(&execution_id).await;
        assert_eq!(pauses[0].status, PauseStatus::Cancelled);
        assert_eq!(h.execution_status(&execution_id).await, WorkflowStatus::Cancelled);

        let second = h.monitor.sweep_once(Utc::now()).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_fail_policy() {
        let h = harness();
        let (execution_id, pause_id) = h.pause(TimeoutAction::Fail, 1.0).await;
        h.expire(&pause_id).await;

        let report = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(report.failed, 1);
        let pauses = h.store.pauses_for(&execution_id).await;
        assert_eq!(pauses[0].status, PauseStatus::Timeout);
        assert_eq!(h.execution_status(&execution_id).await, WorkflowStatus::Error);
    }

    #[tokio::test]
    async fn test_continue_policy_hands_back_to_engine() {
        let h = harness();
        let (execution_id, pause_id) = h.pause(TimeoutAction::Continue, 1.0).await;
        h.expire(&pause_id).await;

        let report = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(report.continued, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(h.execution_status(&execution_id).await, WorkflowStatus::Running);

        let calls = h.resumer.calls.lock().await.clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, execution_id);
        assert_eq!(calls[0].1, "approve");
        assert_eq!(calls[0].2["timed_out"], true);
    }

    #[tokio::test]
    async fn test_unexpired_pause_is_left_alone() {
        let h = harness();
        let (execution_id, _) = h.pause(TimeoutAction::Cancel, 1.0).await;

        let report = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(report.expired, 0);
        assert_eq!(h.execution_status(&execution_id).await, WorkflowStatus::Paused);
    }

    #[tokio::test]
    async fn test_warning_window_sends_once() {
        let h = harness();
        // Ten minutes left: inside the 15 minute window.
        let (execution_id, _) = h.pause(TimeoutAction::Fail, 10.0 / 60.0).await;

        let first = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(first.warnings_sent, 1);
        let second = h.monitor.sweep_once(Utc::now()).await;
        assert_eq!(second.warnings_sent, 0);

        let sent = h.notifier.sent().await;
        let warnings = sent
            .iter()
            .filter(|p| p.kind == crate::hil::PayloadKind::TimeoutWarning)
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(h.execution_status(&execution_id).await, WorkflowStatus::Paused);
    }

    #[tokio::test]
    async fn test_resume_racing_sweep_has_one_winner() {
        for _ in 0..20 {
            let h = harness();
            let (execution_id, pause_id) = h.pause(TimeoutAction::Cancel, 1.0).await;
            h.expire(&pause_id).await;

            let status = h.status.clone();
            let id = execution_id.clone();
            let resume = tokio::spawn(async move {
                status
                    .resume_workflow_execution(&id, "user", Some(json!({})))
                    .await
                    .is_ok()
            });
            let report = h.monitor.sweep_once(Utc::now()).await;
            let resumed = resume.await.unwrap();

            let swept = report.cancelled == 1;
            assert!(resumed ^ swept, "exactly one transition must win");
            assert_eq!(report.cancelled + report.lost_race, report.expired.min(1));

            let pauses = h.store.pauses_for(&execution_id).await;
            assert_eq!(pauses.len(), 1);
            let expected = if resumed {
                (PauseStatus::Resumed, WorkflowStatus::Running)
            } else {
                (PauseStatus::Cancelled, WorkflowStatus::Cancelled)
            };
            assert_eq!(pauses[0].status, expected.0);
            assert_eq!(h.execution_status(&execution_id).await, expected.1);
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness();
        let monitor = Arc::new(h.monitor.with_interval(Duration::from_millis(10)));
        let token = CancellationToken::new();
        let handle = monitor.spawn(token.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
