//! 实时扇出
//!
//! 把事件转换为推送给客户端的线上格式，并广播到房间主题或用户通知主题。
//! 服务本身无状态。

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{
    ChatEvent, ChatEventKind, ChatEventType, MessageId, MessageStatus, NotificationEvent, RoomId,
    Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broadcaster::{room_topic, user_topic, BroadcastError, TopicBroadcaster};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("failed to encode fan-out payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

/// 推送给房间订阅者的单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutMessage {
    pub event_id: String,
    #[serde(rename = "type")]
    pub message_type: ChatEventType,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl From<&ChatEvent> for FanoutMessage {
    fn from(event: &ChatEvent) -> Self {
        let (status, target_user_id) = match &event.kind {
            ChatEventKind::MessageSent { message_status, .. }
            | ChatEventKind::MessageStatusChanged { message_status, .. } => {
                (Some(*message_status), None)
            }
            ChatEventKind::MessageDeleted { .. } => (Some(MessageStatus::Deleted), None),
            ChatEventKind::RoleChanged { target_user_id, .. } => (None, Some(*target_user_id)),
            ChatEventKind::UserJoined { .. }
            | ChatEventKind::UserLeft { .. }
            | ChatEventKind::RoomCreated { .. }
            | ChatEventKind::RoomDeleted { .. } => (None, None),
        };

        Self {
            event_id: event.event_id.clone(),
            message_type: event.event_type(),
            room_id: event.chat_room_id,
            user_id: event.user_id,
            username: event.username.clone(),
            timestamp: event.timestamp,
            content: event.text().map(str::to_owned),
            message_id: event.message_id(),
            status,
            target_user_id,
            metadata: (!event.metadata.is_empty()).then(|| event.metadata.clone()),
        }
    }
}

/// 同一房间的批量推送
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutBatch {
    #[serde(rename = "type")]
    pub batch_type: String,
    pub messages: Vec<FanoutMessage>,
    pub count: usize,
    pub room_id: RoomId,
}

impl FanoutBatch {
    pub const TYPE: &'static str = "BATCH";

    pub fn new(room_id: RoomId, messages: Vec<FanoutMessage>) -> Self {
        Self {
            batch_type: Self::TYPE.to_owned(),
            count: messages.len(),
            messages,
            room_id,
        }
    }
}

pub struct FanoutService {
    broadcaster: Arc<dyn TopicBroadcaster>,
}

impl FanoutService {
    pub fn new(broadcaster: Arc<dyn TopicBroadcaster>) -> Self {
        Self { broadcaster }
    }

    /// 推送单个事件，返回接收到的订阅者数量
    pub async fn deliver(&self, event: &ChatEvent) -> Result<usize, FanoutError> {
        let payload = serde_json::to_string(&FanoutMessage::from(event))?;
        let topic = room_topic(event.chat_room_id);
        let receivers = self.broadcaster.broadcast(&topic, payload).await?;
        tracing::debug!(
            topic = %topic,
            event_id = %event.event_id,
            receivers,
            "事件已推送"
        );
        Ok(receivers)
    }

    /// 按房间分组批量推送，组内保持原有顺序。
    ///
    /// 投递消费者逐条推送；批量接口供一次性补发多条事件的调用方使用。
    pub async fn deliver_batch(&self, events: &[ChatEvent]) -> Result<usize, FanoutError> {
        let mut groups: Vec<(RoomId, Vec<FanoutMessage>)> = Vec::new();
        for event in events {
            let message = FanoutMessage::from(event);
            match groups.iter_mut().find(|(room_id, _)| *room_id == event.chat_room_id) {
                Some((_, messages)) => messages.push(message),
                None => groups.push((event.chat_room_id, vec![message])),
            }
        }

        let mut receivers = 0;
        for (room_id, messages) in groups {
            let payload = serde_json::to_string(&FanoutBatch::new(room_id, messages))?;
            receivers += self.broadcaster.broadcast(&room_topic(room_id), payload).await?;
        }
        Ok(receivers)
    }

    /// 推送到接收者的个人通知主题
    pub async fn deliver_notification(
        &self,
        notification: &NotificationEvent,
    ) -> Result<usize, FanoutError> {
        let payload = serde_json::to_string(notification)?;
        let receivers = self
            .broadcaster
            .broadcast(&user_topic(notification.recipient_id), payload)
            .await?;
        Ok(receivers)
    }
}
