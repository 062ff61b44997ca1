//! Notification channels for interaction requests and timeout warnings.
//!
//! Delivery is fire-and-forget from the suspension protocol's point of view:
//! callers log a failed send and carry on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use weft_steps::InteractionType;

use crate::db::models::Interaction;

/// Default NATS subject prefix for interaction notifications.
pub const DEFAULT_SUBJECT: &str = "weft.interactions";

/// Errors raised by a notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("No channel registered for '{0}'")]
    UnknownChannel(String),
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Request,
    TimeoutWarning,
}

/// Human-readable payload forwarded to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionPayload {
    pub kind: PayloadKind,
    pub interaction_id: String,
    pub execution_id: String,
    pub step_id: String,
    pub interaction_type: InteractionType,
    pub channel: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

impl InteractionPayload {
    pub fn request(interaction: &Interaction) -> Self {
        Self::from_interaction(PayloadKind::Request, interaction)
    }

    pub fn timeout_warning(interaction: &Interaction) -> Self {
        Self::from_interaction(PayloadKind::TimeoutWarning, interaction)
    }

    fn from_interaction(kind: PayloadKind, interaction: &Interaction) -> Self {
        Self {
            kind,
            interaction_id: interaction.id.clone(),
            execution_id: interaction.execution_id.clone(),
            step_id: interaction.step_id.clone(),
            interaction_type: interaction.interaction_type,
            channel: interaction.channel.clone(),
            title: interaction.title.clone(),
            message: interaction.message.clone(),
            options: interaction.options.clone(),
            expires_at: interaction.expires_at,
        }
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn now(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message_id: None,
            delivered_at: Utc::now(),
        }
    }
}

/// A channel that can deliver interaction payloads.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &InteractionPayload) -> Result<DeliveryReceipt, NotifyError>;
}

/// Writes payloads to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, payload: &InteractionPayload) -> Result<DeliveryReceipt, NotifyError> {
        tracing::info!(
            interaction_id = %payload.interaction_id,
            execution_id = %payload.execution_id,
            step_id = %payload.step_id,
            kind = ?payload.kind,
            channel = %payload.channel,
            expires_at = %payload.expires_at,
            "{}",
            payload.message
        );
        Ok(DeliveryReceipt::now(&payload.channel))
    }
}

/// Publishes JSON payloads to `{subject}.{channel}` on NATS.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }

    /// Connect to NATS and build a notifier.
    pub async fn connect(url: &str, subject: &str) -> Result<Self, NotifyError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        tracing::info!(url = %url, subject = %subject, "Connected to NATS");
        Ok(Self::new(client, subject))
    }

    pub fn subject_for(&self, channel: &str) -> String {
        format!("{}.{}", self.subject, channel)
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send(&self, payload: &InteractionPayload) -> Result<DeliveryReceipt, NotifyError> {
        let subject = self.subject_for(&payload.channel);
        let body = serde_json::to_vec(payload)?;

        self.client
            .publish(subject.clone(), body.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        tracing::debug!(
            subject = %subject,
            interaction_id = %payload.interaction_id,
            "Published interaction notification"
        );

        Ok(DeliveryReceipt {
            channel: payload.channel.clone(),
            message_id: Some(subject),
            delivered_at: Utc::now(),
        })
    }
}

/// Routes payloads by channel name, with an optional fallback.
#[derive(Default, Clone)]
pub struct ChannelRouter {
    routes: HashMap<String, Arc<dyn Notifier>>,
    fallback: Option<Arc<dyn Notifier>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.routes.insert(channel.into(), notifier);
        self
    }

    pub fn with_fallback(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.fallback = Some(notifier);
        self
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.routes.keys().cloned().collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl Notifier for ChannelRouter {
    async fn send(&self, payload: &InteractionPayload) -> Result<DeliveryReceipt, NotifyError> {
        let notifier = self
            .routes
            .get(&payload.channel)
            .or(self.fallback.as_ref())
            .ok_or_else(|| NotifyError::UnknownChannel(payload.channel.clone()))?;
        notifier.send(payload).await
    }
}

/// Keeps every payload it is given. Can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<InteractionPayload>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<InteractionPayload> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, payload: &InteractionPayload) -> Result<DeliveryReceipt, NotifyError> {
        if self.fail {
            return Err(NotifyError::Publish("channel unavailable".to_string()));
        }
        self.sent.lock().await.push(payload.clone());
        Ok(DeliveryReceipt::now(&payload.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::fixture;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_router_picks_channel_then_fallback() {
        let slack = Arc::new(RecordingNotifier::new());
        let fallback = Arc::new(RecordingNotifier::new());
        let router = ChannelRouter::new()
            .with_channel("slack", slack.clone())
            .with_fallback(fallback.clone());

        let (_, _, mut interaction) = fixture();
        interaction.channel = "slack".to_string();
        let receipt = assert_ok!(router.send(&InteractionPayload::request(&interaction)).await);
        assert_eq!(receipt.channel, "slack");

        interaction.channel = "email".to_string();
        assert_ok!(
            router
                .send(&InteractionPayload::timeout_warning(&interaction))
                .await
        );

        assert_eq!(slack.sent().await.len(), 1);
        let fallback_sent = fallback.sent().await;
        assert_eq!(fallback_sent.len(), 1);
        assert_eq!(fallback_sent[0].kind, PayloadKind::TimeoutWarning);
    }

    #[tokio::test]
    async fn test_router_without_route_fails() {
        let router = ChannelRouter::new();
        let (_, _, interaction) = fixture();
        let err = router
            .send(&InteractionPayload::request(&interaction))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::UnknownChannel(_)));
    }

    #[test]
    fn test_payload_serializes_kind() {
        let (_, _, interaction) = fixture();
        let value = serde_json::to_value(InteractionPayload::timeout_warning(&interaction)).unwrap();
        assert_eq!(value["kind"], "timeout_warning");
        assert_eq!(value["interaction_type"], "approval");
        assert!(value.get("options").is_none());
    }
}
