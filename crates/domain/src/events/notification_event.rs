use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chat_event::{ChatEvent, ChatEventKind};
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 预览文本的最大字符数
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewMessage,
    UserJoined,
    UserLeft,
    RoomCreated,
    RoleChanged,
}

impl NotificationKind {
    /// 源事件对应的通知类型，不产生通知的事件返回 `None`
    pub fn for_event(kind: &ChatEventKind) -> Option<Self> {
        match kind {
            ChatEventKind::MessageSent { .. } => Some(NotificationKind::NewMessage),
            ChatEventKind::UserJoined { .. } => Some(NotificationKind::UserJoined),
            ChatEventKind::UserLeft { .. } => Some(NotificationKind::UserLeft),
            ChatEventKind::RoomCreated { .. } => Some(NotificationKind::RoomCreated),
            ChatEventKind::RoleChanged { .. } => Some(NotificationKind::RoleChanged),
            ChatEventKind::MessageStatusChanged { .. }
            | ChatEventKind::MessageDeleted { .. }
            | ChatEventKind::RoomDeleted { .. } => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            NotificationKind::NewMessage => "NEW_MESSAGE",
            NotificationKind::UserJoined => "USER_JOINED",
            NotificationKind::UserLeft => "USER_LEFT",
            NotificationKind::RoomCreated => "ROOM_CREATED",
            NotificationKind::RoleChanged => "ROLE_CHANGED",
        };
        f.write_str(value)
    }
}

/// 发给单个接收者的通知记录，按接收者 ID 分区。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_id: String,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub room_id: RoomId,
    pub source_event_id: String,
    pub actor_username: String,
    pub preview: String,
    pub timestamp: Timestamp,
}

impl NotificationEvent {
    /// 根据源事件为指定接收者生成通知
    pub fn from_chat_event(event: &ChatEvent, recipient_id: UserId) -> Option<Self> {
        let kind = NotificationKind::for_event(&event.kind)?;
        let preview = event
            .text()
            .map(|text| text.chars().take(PREVIEW_CHARS).collect())
            .unwrap_or_default();

        Some(Self {
            event_id: Uuid::new_v4().to_string(),
            recipient_id,
            kind,
            room_id: event.chat_room_id,
            source_event_id: event.event_id.clone(),
            actor_username: event.username.clone(),
            preview,
            timestamp: event.timestamp,
        })
    }

    pub fn partition_key(&self) -> String {
        self.recipient_id.to_string()
    }
}
