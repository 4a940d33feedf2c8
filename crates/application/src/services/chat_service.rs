use std::sync::Arc;

use domain::{
    ChatEvent, ChatRoom, DomainError, MembershipService, Message, MessageContent, MessageId,
    MessagePolicy, MessageStatus, ParticipantRole, RepositoryError, RoomId, RoomName, RoomType,
    UserId,
};

use crate::{
    clock::Clock,
    dto::{MessageDto, Page, RoomDto},
    error::ApplicationError,
    publisher::EventPublisher,
    repository::{ChatRoomRepository, MessageRepository, PageRequest, UserRepository},
};

/// 房间保存遇到版本冲突时的最大尝试次数
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// 已认证的操作者（从 JWT 获取）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub room_type: RoomType,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub content: String,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// 房间与消息用例。
///
/// 每个用例先修改聚合并保存，保存成功后才发布事件。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load_room(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    async fn load_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    /// 加载、修改并保存房间；版本冲突时重新加载并重试整个操作
    async fn mutate_room<T, F>(&self, room_id: RoomId, mut op: F) -> Result<(ChatRoom, T), ApplicationError>
    where
        F: FnMut(&mut ChatRoom) -> Result<T, DomainError> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let mut room = self.load_room(room_id).await?;
            let outcome = op(&mut room)?;

            match self.deps.room_repository.save(room).await {
                Ok(saved) => return Ok((saved, outcome)),
                Err(RepositoryError::Conflict) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::warn!(room_id = %room_id, attempt, "房间版本冲突，重新加载后重试");
                    attempt += 1;
                }
                Err(RepositoryError::NotFound) => return Err(DomainError::RoomNotFound.into()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn create_room(
        &self,
        actor: &Actor,
        request: CreateRoomRequest,
    ) -> Result<RoomDto, ApplicationError> {
        let name = RoomName::parse(request.name)?;
        let room = ChatRoom::create(
            RoomId::generate(),
            name,
            request.room_type,
            actor.user_id,
            self.deps.clock.now(),
        );

        let saved = self.deps.room_repository.save(room).await?;
        tracing::info!(room_id = %saved.id, creator = %actor.user_id, "房间已创建");

        self.deps
            .publisher
            .publish(ChatEvent::room_created(&saved, actor.user_id, &actor.username));
        Ok(RoomDto::from(&saved))
    }

    /// 只有成员可以查看房间详情与成员列表
    pub async fn get_room(&self, actor: &Actor, room_id: RoomId) -> Result<RoomDto, ApplicationError> {
        let room = self.load_room(room_id).await?;
        if !room.is_participant(actor.user_id) {
            return Err(DomainError::ParticipantNotFound.into());
        }
        Ok(RoomDto::from(&room))
    }

    pub async fn list_rooms(&self, actor: &Actor) -> Result<Vec<RoomDto>, ApplicationError> {
        let rooms = self.deps.room_repository.list_for_user(actor.user_id).await?;
        Ok(rooms.iter().map(RoomDto::from).collect())
    }

    /// 流式连接进入房间前的成员校验
    pub async fn ensure_participant(&self, room_id: RoomId, user_id: UserId) -> Result<(), ApplicationError> {
        if !self.deps.room_repository.exists_by_id(room_id).await? {
            return Err(DomainError::RoomNotFound.into());
        }
        if !self
            .deps
            .room_repository
            .participant_exists(user_id, room_id)
            .await?
        {
            return Err(DomainError::ParticipantNotFound.into());
        }
        Ok(())
    }

    pub async fn join_room(&self, actor: &Actor, room_id: RoomId) -> Result<RoomDto, ApplicationError> {
        let now = self.deps.clock.now();
        let (room, ()) = self
            .mutate_room(room_id, |room| {
                MembershipService::join_room(room, actor.user_id, now)
            })
            .await?;

        self.deps
            .publisher
            .publish(ChatEvent::user_joined(room_id, actor.user_id, &actor.username, now));
        Ok(RoomDto::from(&room))
    }

    pub async fn invite_user(
        &self,
        actor: &Actor,
        room_id: RoomId,
        invitee: UserId,
    ) -> Result<RoomDto, ApplicationError> {
        let invitee_user = self
            .deps
            .user_repository
            .find_by_id(invitee)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let now = self.deps.clock.now();
        let (room, ()) = self
            .mutate_room(room_id, |room| {
                MembershipService::invite_user(room, invitee, actor.user_id, now)
            })
            .await?;

        self.deps.publisher.publish(
            ChatEvent::user_joined(room_id, invitee, invitee_user.username.as_str(), now)
                .with_metadata("invitedBy", actor.user_id),
        );
        Ok(RoomDto::from(&room))
    }

    pub async fn leave_room(&self, actor: &Actor, room_id: RoomId) -> Result<(), ApplicationError> {
        let now = self.deps.clock.now();
        let (_, removal) = self
            .mutate_room(room_id, |room| {
                MembershipService::remove_user(room, actor.user_id, actor.user_id)
            })
            .await?;

        let mut event = ChatEvent::user_left(room_id, actor.user_id, &actor.username, now);
        if let Some(promoted) = removal.promoted {
            tracing::info!(room_id = %room_id, promoted = %promoted, "管理员离开，已提升继任者");
            event = event.with_metadata("promotedUserId", promoted);
        }
        self.deps.publisher.publish(event);
        Ok(())
    }

    /// 管理员移除成员，目标为自己时等同离开
    pub async fn remove_participant(
        &self,
        actor: &Actor,
        room_id: RoomId,
        target: UserId,
    ) -> Result<RoomDto, ApplicationError> {
        let target_username = if target == actor.user_id {
            actor.username.clone()
        } else {
            self.deps
                .user_repository
                .find_by_id(target)
                .await?
                .map(|user| user.username.as_str().to_owned())
                .unwrap_or_else(|| target.to_string())
        };

        let now = self.deps.clock.now();
        let (room, removal) = self
            .mutate_room(room_id, |room| {
                MembershipService::remove_user(room, target, actor.user_id)
            })
            .await?;

        let mut event = ChatEvent::user_left(room_id, target, &target_username, now);
        if !removal.self_leave {
            event = event.with_metadata("removedBy", actor.user_id);
        }
        if let Some(promoted) = removal.promoted {
            event = event.with_metadata("promotedUserId", promoted);
        }
        self.deps.publisher.publish(event);
        Ok(RoomDto::from(&room))
    }

    pub async fn change_participant_role(
        &self,
        actor: &Actor,
        room_id: RoomId,
        target: UserId,
        new_role: ParticipantRole,
    ) -> Result<RoomDto, ApplicationError> {
        let now = self.deps.clock.now();
        let (room, ()) = self
            .mutate_room(room_id, |room| {
                MembershipService::change_participant_role(room, target, new_role, actor.user_id)
            })
            .await?;

        self.deps.publisher.publish(ChatEvent::role_changed(
            room_id,
            actor.user_id,
            &actor.username,
            target,
            new_role,
            now,
        ));
        Ok(RoomDto::from(&room))
    }

    pub async fn rename_room(
        &self,
        actor: &Actor,
        room_id: RoomId,
        name: String,
    ) -> Result<RoomDto, ApplicationError> {
        let name = RoomName::parse(name)?;
        let (room, ()) = self
            .mutate_room(room_id, |room| {
                MembershipService::ensure_can_rename_room(room, actor.user_id)?;
                room.change_name(name.clone());
                Ok(())
            })
            .await?;
        Ok(RoomDto::from(&room))
    }

    /// 成员开关自己在该房间的通知
    pub async fn set_notifications(
        &self,
        actor: &Actor,
        room_id: RoomId,
        enabled: bool,
    ) -> Result<RoomDto, ApplicationError> {
        let (room, ()) = self
            .mutate_room(room_id, |room| room.set_notifications(actor.user_id, enabled))
            .await?;
        tracing::debug!(room_id = %room_id, user_id = %actor.user_id, enabled, "通知设置已更新");
        Ok(RoomDto::from(&room))
    }

    pub async fn delete_room(&self, actor: &Actor, room_id: RoomId) -> Result<(), ApplicationError> {
        let room = self.load_room(room_id).await?;
        MembershipService::ensure_can_delete_room(&room, actor.user_id)?;

        self.deps.room_repository.delete(room_id).await?;
        tracing::info!(room_id = %room_id, deleted_by = %actor.user_id, "房间已删除");

        self.deps.publisher.publish(ChatEvent::room_deleted(
            room_id,
            actor.user_id,
            &actor.username,
            self.deps.clock.now(),
        ));
        Ok(())
    }

    pub async fn send_message(
        &self,
        actor: &Actor,
        request: SendMessageRequest,
    ) -> Result<MessageDto, ApplicationError> {
        let content = MessageContent::new(request.content)?;
        let room = self.load_room(request.room_id).await?;
        let message = Message::create(
            MessageId::generate(),
            content,
            actor.user_id,
            &room,
            self.deps.clock.now(),
        )?;

        let stored = self.deps.message_repository.save(message).await?;
        self.deps
            .publisher
            .publish(ChatEvent::message_sent(&stored, &actor.username));
        Ok(MessageDto::from(&stored))
    }

    /// 发送者切换消息的 SENT/READ 状态，删除走 [`Self::delete_message`]
    pub async fn update_message_status(
        &self,
        actor: &Actor,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<MessageDto, ApplicationError> {
        if status == MessageStatus::Deleted {
            return Err(DomainError::invalid_argument(
                "message_status",
                "use the delete operation to delete a message",
            )
            .into());
        }

        let mut message = self.load_message(message_id).await?;
        MessagePolicy::ensure_can_update_message(&message, actor.user_id)?;
        message.update_status(status)?;

        let stored = self.deps.message_repository.save(message).await?;
        self.deps.publisher.publish(ChatEvent::message_status_changed(
            &stored,
            actor.user_id,
            &actor.username,
            self.deps.clock.now(),
        ));
        Ok(MessageDto::from(&stored))
    }

    /// 发送者或房间管理员删除消息，消息保留为 DELETED 状态
    pub async fn delete_message(&self, actor: &Actor, message_id: MessageId) -> Result<(), ApplicationError> {
        let mut message = self.load_message(message_id).await?;
        let room = self.load_room(message.room_id()).await?;
        MessagePolicy::ensure_can_delete_message(&message, &room, actor.user_id)?;
        message.mark_deleted()?;

        let stored = self.deps.message_repository.save(message).await?;
        self.deps.publisher.publish(ChatEvent::message_deleted(
            &stored,
            actor.user_id,
            &actor.username,
            self.deps.clock.now(),
        ));
        Ok(())
    }

    /// 成员分页读取房间消息，最新的在前
    pub async fn get_messages(
        &self,
        actor: &Actor,
        room_id: RoomId,
        page: PageRequest,
    ) -> Result<Page<MessageDto>, ApplicationError> {
        self.ensure_participant(room_id, actor.user_id).await?;
        let messages = self.deps.message_repository.find_by_room(room_id, page).await?;
        Ok(Page {
            items: messages.iter().map(MessageDto::from).collect(),
            page: page.page,
            size: page.size,
        })
    }
}
