//! 聊天领域事件
//!
//! 每次成功提交的状态变更对应一条不可变的 [`ChatEvent`]，序列化为 camelCase JSON
//! 后经由消息代理分发给各消费者组。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat_room::{ChatRoom, ParticipantRole};
use crate::message::{Message, MessageStatus};
use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEventType {
    MessageSent,
    MessageStatusChanged,
    MessageDeleted,
    UserJoined,
    UserLeft,
    RoleChanged,
    RoomCreated,
    RoomDeleted,
}

impl ChatEventType {
    pub const ALL: [ChatEventType; 8] = [
        ChatEventType::MessageSent,
        ChatEventType::MessageStatusChanged,
        ChatEventType::MessageDeleted,
        ChatEventType::UserJoined,
        ChatEventType::UserLeft,
        ChatEventType::RoleChanged,
        ChatEventType::RoomCreated,
        ChatEventType::RoomDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatEventType::MessageSent => "MESSAGE_SENT",
            ChatEventType::MessageStatusChanged => "MESSAGE_STATUS_CHANGED",
            ChatEventType::MessageDeleted => "MESSAGE_DELETED",
            ChatEventType::UserJoined => "USER_JOINED",
            ChatEventType::UserLeft => "USER_LEFT",
            ChatEventType::RoleChanged => "ROLE_CHANGED",
            ChatEventType::RoomCreated => "ROOM_CREATED",
            ChatEventType::RoomDeleted => "ROOM_DELETED",
        }
    }

    /// 事件所属的消息流：消息类事件走消息主题，其余走房间事件主题
    pub fn stream(&self) -> EventStream {
        match self {
            ChatEventType::MessageSent
            | ChatEventType::MessageStatusChanged
            | ChatEventType::MessageDeleted => EventStream::Messages,
            ChatEventType::UserJoined
            | ChatEventType::UserLeft
            | ChatEventType::RoleChanged
            | ChatEventType::RoomCreated
            | ChatEventType::RoomDeleted => EventStream::RoomEvents,
        }
    }
}

impl fmt::Display for ChatEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 代理上的逻辑消息流，具体主题名由配置决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStream {
    Messages,
    RoomEvents,
    Notifications,
}

/// 事件类型及其专属字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "eventType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ChatEventKind {
    MessageSent {
        message_id: MessageId,
        message_content: String,
        message_status: MessageStatus,
    },
    MessageStatusChanged {
        message_id: MessageId,
        message_status: MessageStatus,
    },
    MessageDeleted {
        message_id: MessageId,
    },
    UserJoined {
        content: String,
    },
    UserLeft {
        content: String,
    },
    RoleChanged {
        target_user_id: UserId,
        new_role: ParticipantRole,
        content: String,
    },
    RoomCreated {
        content: String,
    },
    RoomDeleted {
        content: String,
    },
}

/// 聊天事件记录，构造后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub kind: ChatEventKind,
    pub chat_room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ChatEvent {
    fn new(
        kind: ChatEventKind,
        chat_room_id: RoomId,
        user_id: UserId,
        username: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            chat_room_id,
            user_id,
            username: username.into(),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn message_sent(message: &Message, username: impl Into<String>) -> Self {
        Self::new(
            ChatEventKind::MessageSent {
                message_id: message.id(),
                message_content: message.content().as_str().to_owned(),
                message_status: message.status(),
            },
            message.room_id(),
            message.sender_id(),
            username,
            message.created_at(),
        )
    }

    pub fn message_status_changed(
        message: &Message,
        actor: UserId,
        username: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self::new(
            ChatEventKind::MessageStatusChanged {
                message_id: message.id(),
                message_status: message.status(),
            },
            message.room_id(),
            actor,
            username,
            now,
        )
    }

    pub fn message_deleted(
        message: &Message,
        actor: UserId,
        username: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self::new(
            ChatEventKind::MessageDeleted {
                message_id: message.id(),
            },
            message.room_id(),
            actor,
            username,
            now,
        )
    }

    pub fn user_joined(room_id: RoomId, user_id: UserId, username: &str, now: Timestamp) -> Self {
        Self::new(
            ChatEventKind::UserJoined {
                content: format!("{username} joined the room"),
            },
            room_id,
            user_id,
            username,
            now,
        )
    }

    pub fn user_left(room_id: RoomId, user_id: UserId, username: &str, now: Timestamp) -> Self {
        Self::new(
            ChatEventKind::UserLeft {
                content: format!("{username} left the room"),
            },
            room_id,
            user_id,
            username,
            now,
        )
    }

    pub fn role_changed(
        room_id: RoomId,
        actor: UserId,
        username: &str,
        target_user_id: UserId,
        new_role: ParticipantRole,
        now: Timestamp,
    ) -> Self {
        Self::new(
            ChatEventKind::RoleChanged {
                target_user_id,
                new_role,
                content: format!("{username} changed role of {target_user_id} to {new_role}"),
            },
            room_id,
            actor,
            username,
            now,
        )
    }

    pub fn room_created(room: &ChatRoom, creator: UserId, username: &str) -> Self {
        Self::new(
            ChatEventKind::RoomCreated {
                content: format!("{username} created room {}", room.name),
            },
            room.id,
            creator,
            username,
            room.created_at,
        )
    }

    pub fn room_deleted(room_id: RoomId, actor: UserId, username: &str, now: Timestamp) -> Self {
        Self::new(
            ChatEventKind::RoomDeleted {
                content: format!("{username} deleted the room"),
            },
            room_id,
            actor,
            username,
            now,
        )
    }

    /// 附加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn event_type(&self) -> ChatEventType {
        match &self.kind {
            ChatEventKind::MessageSent { .. } => ChatEventType::MessageSent,
            ChatEventKind::MessageStatusChanged { .. } => ChatEventType::MessageStatusChanged,
            ChatEventKind::MessageDeleted { .. } => ChatEventType::MessageDeleted,
            ChatEventKind::UserJoined { .. } => ChatEventType::UserJoined,
            ChatEventKind::UserLeft { .. } => ChatEventType::UserLeft,
            ChatEventKind::RoleChanged { .. } => ChatEventType::RoleChanged,
            ChatEventKind::RoomCreated { .. } => ChatEventType::RoomCreated,
            ChatEventKind::RoomDeleted { .. } => ChatEventType::RoomDeleted,
        }
    }

    pub fn stream(&self) -> EventStream {
        self.event_type().stream()
    }

    /// 分区键：同一房间的事件落在同一分区以保证顺序
    pub fn partition_key(&self) -> String {
        self.chat_room_id.to_string()
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match &self.kind {
            ChatEventKind::MessageSent { message_id, .. }
            | ChatEventKind::MessageStatusChanged { message_id, .. }
            | ChatEventKind::MessageDeleted { message_id } => Some(*message_id),
            _ => None,
        }
    }

    /// 事件的可读文本：消息正文或成员变更描述
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ChatEventKind::MessageSent {
                message_content, ..
            } => Some(message_content),
            ChatEventKind::UserJoined { content }
            | ChatEventKind::UserLeft { content }
            | ChatEventKind::RoleChanged { content, .. }
            | ChatEventKind::RoomCreated { content }
            | ChatEventKind::RoomDeleted { content } => Some(content),
            ChatEventKind::MessageStatusChanged { .. } | ChatEventKind::MessageDeleted { .. } => {
                None
            }
        }
    }
}
