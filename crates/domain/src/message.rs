use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chat_room::ChatRoom;
use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 消息状态。SENT 与 READ 可互相切换，DELETED 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Read,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::Read => "READ",
            MessageStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(MessageStatus::Sent),
            "READ" => Ok(MessageStatus::Read),
            "DELETED" => Ok(MessageStatus::Deleted),
            other => Err(DomainError::invalid_argument(
                "message_status",
                format!("unknown status {other}"),
            )),
        }
    }
}

/// 消息聚合。所属房间与发送者在创建后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    room_id: RoomId,
    sender_id: UserId,
    content: MessageContent,
    status: MessageStatus,
    created_at: Timestamp,
}

impl Message {
    /// 创建新消息，发送者必须是房间的当前参与者。
    pub fn create(
        id: MessageId,
        content: MessageContent,
        sender_id: UserId,
        room: &ChatRoom,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if !room.is_participant(sender_id) {
            return Err(DomainError::SenderNotParticipant);
        }

        Ok(Self {
            id,
            room_id: room.id,
            sender_id,
            content,
            status: MessageStatus::Sent,
            created_at: now,
        })
    }

    /// 从存储中恢复消息
    pub fn restore(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        content: MessageContent,
        status: MessageStatus,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            status,
            created_at,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn is_deleted(&self) -> bool {
        self.status == MessageStatus::Deleted
    }

    pub fn update_status(&mut self, status: MessageStatus) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::MessageDeleted);
        }
        self.status = status;
        Ok(())
    }

    pub fn mark_deleted(&mut self) -> Result<(), DomainError> {
        self.update_status(MessageStatus::Deleted)
    }
}
