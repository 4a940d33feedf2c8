use domain::{
    ChatRoom, Message, MessageStatus, Participant, ParticipantRole, RoomType, Timestamp, User,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub created_at: Timestamp,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: Uuid::from(user.id),
            username: user.username.as_str().to_owned(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub user_id: Uuid,
    pub role: ParticipantRole,
    pub joined_at: Timestamp,
    pub notifications_enabled: bool,
}

impl From<&Participant> for ParticipantDto {
    fn from(participant: &Participant) -> Self {
        Self {
            user_id: Uuid::from(participant.user_id),
            role: participant.role,
            joined_at: participant.joined_at,
            notifications_enabled: participant.notifications_enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: Uuid,
    pub name: String,
    pub room_type: RoomType,
    pub created_at: Timestamp,
    pub version: i64,
    pub participants: Vec<ParticipantDto>,
}

impl From<&ChatRoom> for RoomDto {
    fn from(room: &ChatRoom) -> Self {
        Self {
            id: Uuid::from(room.id),
            name: room.name.as_str().to_owned(),
            room_type: room.room_type,
            created_at: room.created_at,
            version: room.version,
            participants: room.participants().iter().map(ParticipantDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    /// 已删除消息的正文不再返回
    pub content: Option<String>,
    pub status: MessageStatus,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id()),
            room_id: Uuid::from(message.room_id()),
            sender_id: Uuid::from(message.sender_id()),
            content: (!message.is_deleted()).then(|| message.content().as_str().to_owned()),
            status: message.status(),
            created_at: message.created_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
}
