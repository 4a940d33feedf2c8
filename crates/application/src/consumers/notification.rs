use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, NotificationEvent};

use super::{ChatEventHandler, ConsumerError};
use crate::publisher::EventPublisher;
use crate::repository::ChatRoomRepository;

/// chat-notification 组：为房间内除操作者外、开启了通知的成员生成通知事件
pub struct NotificationConsumer {
    rooms: Arc<dyn ChatRoomRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl NotificationConsumer {
    pub fn new(rooms: Arc<dyn ChatRoomRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { rooms, publisher }
    }

    async fn notify_participants(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        let Some(room) = self.rooms.find_by_id(event.chat_room_id).await? else {
            tracing::debug!(room_id = %event.chat_room_id, event_id = %event.event_id, "房间已不存在，跳过通知");
            return Ok(());
        };

        let mut emitted = 0usize;
        for participant in room
            .participants()
            .iter()
            .filter(|p| p.user_id != event.user_id && p.notifications_enabled)
        {
            if let Some(notification) = NotificationEvent::from_chat_event(event, participant.user_id) {
                self.publisher.publish_notification(notification);
                emitted += 1;
            }
        }

        tracing::debug!(
            room_id = %event.chat_room_id,
            event_type = %event.event_type(),
            emitted,
            "通知已生成"
        );
        Ok(())
    }
}

#[async_trait]
impl ChatEventHandler for NotificationConsumer {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn on_message_sent(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.notify_participants(event).await
    }

    async fn on_message_status_changed(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_message_deleted(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_user_joined(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.notify_participants(event).await
    }

    async fn on_user_left(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.notify_participants(event).await
    }

    async fn on_role_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.notify_participants(event).await
    }

    async fn on_room_created(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.notify_participants(event).await
    }

    async fn on_room_deleted(&self, _event: &ChatEvent) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn on_notification(&self, _notification: &NotificationEvent) -> Result<(), ConsumerError> {
        Ok(())
    }
}
