use crate::chat_room::ChatRoom;
use crate::errors::{DomainError, DomainResult};
use crate::message::Message;
use crate::value_objects::UserId;

/// 消息操作权限
pub struct MessagePolicy;

impl MessagePolicy {
    /// 发送者本人或房间管理员可以删除消息
    pub fn can_user_delete_message(message: &Message, room: &ChatRoom, user_id: UserId) -> bool {
        message.sender_id() == user_id || room.is_admin(user_id)
    }

    /// 只有发送者可以修改消息状态
    pub fn can_user_update_message(message: &Message, user_id: UserId) -> bool {
        message.sender_id() == user_id
    }

    pub fn ensure_can_delete_message(
        message: &Message,
        room: &ChatRoom,
        user_id: UserId,
    ) -> DomainResult<()> {
        if Self::can_user_delete_message(message, room, user_id) {
            Ok(())
        } else {
            Err(DomainError::CannotDeleteMessage)
        }
    }

    pub fn ensure_can_update_message(message: &Message, user_id: UserId) -> DomainResult<()> {
        if Self::can_user_update_message(message, user_id) {
            Ok(())
        } else {
            Err(DomainError::NotMessageSender)
        }
    }
}
