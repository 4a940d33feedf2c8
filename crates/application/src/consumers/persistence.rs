use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, NotificationEvent};

use super::{ChatEventHandler, ConsumerError};
use crate::repository::MessageRepository;

/// chat-persistence-verify 组：核对消息事件引用的消息确实已落库。
///
/// 只记录异常，从不补写消息。
pub struct PersistenceVerificationConsumer {
    messages: Arc<dyn MessageRepository>,
    anomalies: AtomicU64,
}

impl PersistenceVerificationConsumer {
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self {
            messages,
            anomalies: AtomicU64::new(0),
        }
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    async fn verify(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        let Some(message_id) = event.message_id() else {
            return Ok(());
        };

        if !self.messages.exists_by_id(message_id).await? {
            let total = self.anomalies.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.event_type(),
                message_id = %message_id,
                room_id = %event.chat_room_id,
                anomalies = total,
                "事件引用的消息不存在"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ChatEventHandler for PersistenceVerificationConsumer {
    fn name(&self) -> &'static str {
        "persistence-verification"
    }

    async fn on_message_sent(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.verify(event).await
    }

    async fn on_message_status_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.verify(event).await
    }

    async fn on_message_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.verify(event).await
    }

    async fn on_user_joined(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_user_left(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_role_changed(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_room_created(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_room_deleted(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_notification(&self, _notification: &NotificationEvent) -> Result<(), ConsumerError> {
        Ok(())
    }
}
