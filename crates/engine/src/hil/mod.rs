//! Suspension (human-in-the-loop) protocol.
//!
//! A human-in-loop step returns a Paused result carrying a [`PauseRequest`].
//! The engine hands it to [`SuspensionService::suspend`], which persists the
//! pause and its interaction, then notifies the interaction's channel.
//! Notification is best effort: a failed send is logged and never undoes the
//! suspension.

pub mod notify;

use std::sync::Arc;

use weft_steps::PauseRequest;

use crate::db::models::{Interaction, InteractionStatus, PauseRecord};
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;
use crate::status::WorkflowStatusManager;

pub use self::notify::{
    ChannelRouter, DeliveryReceipt, InteractionPayload, LogNotifier, NatsNotifier, Notifier,
    NotifyError, PayloadKind, RecordingNotifier,
};

pub struct SuspensionService {
    status: Arc<WorkflowStatusManager>,
    notifier: Arc<dyn Notifier>,
}

impl SuspensionService {
    pub fn new(status: Arc<WorkflowStatusManager>) -> Self {
        Self {
            status,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn status(&self) -> &Arc<WorkflowStatusManager> {
        &self.status
    }

    /// Persist the pause for `step_id` and notify its channel.
    pub async fn suspend(
        &self,
        execution_id: &str,
        step_id: &str,
        request: &PauseRequest,
        checkpoint: &serde_json::Value,
    ) -> AppResult<(PauseRecord, Interaction)> {
        let (pause, interaction) = self
            .status
            .create_pause_record(execution_id, step_id, request, checkpoint)
            .await?;

        let _ = self
            .notify(&InteractionPayload::request(&interaction))
            .await
            .log(format!("notifying interaction {}", interaction.id));

        Ok((pause, interaction))
    }

    async fn notify(&self, payload: &InteractionPayload) -> AppResult<DeliveryReceipt> {
        Ok(self.notifier.send(payload).await?)
    }

    /// Look up an interaction that can still take a response.
    pub async fn pending_interaction(&self, interaction_id: &str) -> AppResult<Interaction> {
        let interaction = self
            .status
            .store()
            .get_interaction(interaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("interaction {}", interaction_id)))?;

        if interaction.status != InteractionStatus::Pending {
            return Err(AppError::Conflict(format!(
                "interaction {} is already {}",
                interaction_id, interaction.status
            )));
        }
        Ok(interaction)
    }

    /// Send a timeout warning for an interaction, at most once.
    ///
    /// Returns true if this call claimed the warning.
    pub async fn warn(&self, interaction: &Interaction) -> AppResult<bool> {
        if !self.status.store().mark_warning_sent(&interaction.id).await? {
            return Ok(false);
        }

        let _ = self
            .notify(&InteractionPayload::timeout_warning(interaction))
            .await
            .log(format!("sending timeout warning for {}", interaction.id));
        self.status.emit_warning(interaction);
        Ok(true)
    }
}
