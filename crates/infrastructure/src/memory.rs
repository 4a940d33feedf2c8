//! 内存仓储
//!
//! 未配置数据库时使用，同时作为集成测试的存储。语义与 PostgreSQL 实现一致：
//! 用户名唯一、房间按版本号乐观锁、删除房间级联删除消息。

use std::collections::HashMap;

use application::{ChatRoomRepository, MessageRepository, PageRequest, UserRepository};
use async_trait::async_trait;
use domain::{ChatRoom, Message, MessageId, RepositoryError, RoomId, User, UserId, Username};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, ChatRoom>,
    messages: HashMap<MessageId, Message>,
}

/// 三个仓储接口共用的内存存储
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryStorage {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| &user.username == username)
            .cloned())
    }

    async fn exists_by_id(&self, id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.tables.read().await.users.contains_key(&id))
    }

    async fn save(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.username == user.username && existing.id != user.id);
        if taken {
            return Err(RepositoryError::Duplicate {
                constraint: "users_username_key".to_owned(),
            });
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryStorage {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(self.tables.read().await.rooms.get(&id).cloned())
    }

    async fn exists_by_id(&self, id: RoomId) -> Result<bool, RepositoryError> {
        Ok(self.tables.read().await.rooms.contains_key(&id))
    }

    async fn save(&self, mut room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.rooms.get(&room.id) {
            Some(stored) if stored.version != room.version => return Err(RepositoryError::Conflict),
            Some(_) => {}
            None if room.version != 0 => return Err(RepositoryError::NotFound),
            None => {}
        }

        room.version += 1;
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.rooms.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        tables.messages.retain(|_, message| message.room_id() != id);
        Ok(())
    }

    async fn participant_exists(&self, user_id: UserId, room_id: RoomId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.is_participant(user_id)))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rooms: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|room| room.is_participant(user_id))
            .cloned()
            .collect();
        rooms.sort_by_key(|room| room.created_at);
        Ok(rooms)
    }
}

#[async_trait]
impl MessageRepository for InMemoryStorage {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn exists_by_id(&self, id: MessageId) -> Result<bool, RepositoryError> {
        Ok(self.tables.read().await.messages.contains_key(&id))
    }

    async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&message.room_id()) {
            return Err(RepositoryError::storage("message references a missing room"));
        }
        tables.messages.insert(message.id(), message.clone());
        Ok(message)
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        match self.tables.write().await.messages.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_room(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|message| message.room_id() == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(messages
            .into_iter()
            .skip(offset)
            .take(page.size as usize)
            .collect())
    }
}
